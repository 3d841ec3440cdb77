//! Transaction wrapper for a single change
//!
//! Every change runs in its own transaction. The wrapper checks the script
//! state before starting, optionally refuses to run when the change would
//! destroy rows, and on the way out records whether the change committed.

use crate::diff::Change;
use crate::error::DacpacDiffError;
use crate::output::SqlFileBuilder;

const CHECK_STATE_START: &str = "EXEC #usp_CheckState 1";
const CHECK_STATE_END: &str = "EXEC #usp_CheckState 2";
pub(super) const STOP_IF_INACTIVE: &str = "IF (dbo.tmpIsActive() = 0) SET NOEXEC ON";

/// A change formatted as a self-contained, transactional script block
pub trait MssqlDiffBlock {
    type Diff: Change;

    fn diff(&self) -> &Self::Diff;

    /// Statements that perform the change
    fn format_body<B: SqlFileBuilder>(&self, sb: &mut B) -> Result<(), DacpacDiffError>;

    /// Full block: state check, data-loss guard, body, commit
    fn format<B: SqlFileBuilder>(&self, sb: &mut B) -> Result<(), DacpacDiffError> {
        write_block_header(sb);

        if !sb.options().disable_dataloss_check {
            let table = self
                .diff()
                .data_loss()
                .and_then(|change| change.data_loss_table())
                .filter(|table| !table.is_empty());
            if let Some(table) = table {
                write_data_loss_guard(sb, &table);
            }
        }

        self.format_body(sb)?;
        sb.ensure_line();

        write_block_footer(sb);
        Ok(())
    }
}

fn write_block_header<B: SqlFileBuilder>(sb: &mut B) {
    if sb.options().pretty_print {
        sb.append_line(CHECK_STATE_START)
            .append_line("BEGIN TRAN")
            .append_line(STOP_IF_INACTIVE);
    } else {
        sb.append_line(&format!(
            "{}; BEGIN TRAN; {}",
            CHECK_STATE_START, STOP_IF_INACTIVE
        ));
    }
    sb.append_line("GO").append_line("");
}

fn write_data_loss_guard<B: SqlFileBuilder>(sb: &mut B, table: &str) {
    sb.append_line(&format!("IF EXISTS (SELECT TOP 1 1 FROM {}) BEGIN", table))
        .append_line(&format!(
            "    EXEC #print 1, '[WARN] This change may cause dataloss to {}. Verify and remove this error block to continue.'",
            table
        ))
        .append_line("    IF (@@TRANCOUNT > 0) ROLLBACK")
        .append_line("    SET NOEXEC ON")
        .append_line("END")
        .append_line("");
}

fn write_block_footer<B: SqlFileBuilder>(sb: &mut B) {
    sb.append_line("").append_line("GO");
    if sb.options().pretty_print {
        sb.append_line("SET NOEXEC OFF")
            .append_line(CHECK_STATE_END)
            .append_line(STOP_IF_INACTIVE)
            .append_line("COMMIT");
    } else {
        sb.append_line(&format!(
            "SET NOEXEC OFF; {}; {}; COMMIT",
            CHECK_STATE_END, STOP_IF_INACTIVE
        ));
    }
    sb.append_line("GO");
}
