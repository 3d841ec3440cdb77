//! SQL Server delta scripts
//!
//! A script is a header that installs the state-tracking helpers, one
//! transactional block per change, and a footer that reports the outcome.
//! Once any block fails, `dbo.tmpIsActive()` returns 0 and every later block
//! compiles but does not execute (`SET NOEXEC ON`).

mod block;
mod format;

use chrono::{DateTime, Local};

use crate::diff::{Change, Difference};
use crate::error::DacpacDiffError;
use crate::output::{OutputOptions, SqlFileBuilder, SqlScriptBuilder};

pub use block::MssqlDiffBlock;
pub use format::DiffBlock;

/// Session key holding the "still running" flag
const ACTIVE_KEY: &str = "N'DacpacDiff.IsActive'";

/// Where a [`MssqlScriptWriter`] is in the script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Header,
    Blocks,
    Footer,
    Done,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Header => "header",
            Phase::Blocks => "blocks",
            Phase::Footer => "footer",
            Phase::Done => "done",
        }
    }
}

/// Writes a complete delta script, one phase at a time
#[derive(Debug)]
pub struct MssqlScriptWriter {
    sb: SqlScriptBuilder,
    phase: Phase,
    blocks: usize,
    generated_at: DateTime<Local>,
}

impl MssqlScriptWriter {
    pub fn new(options: OutputOptions) -> Self {
        Self {
            sb: SqlScriptBuilder::new(options),
            phase: Phase::Start,
            blocks: 0,
            generated_at: Local::now(),
        }
    }

    /// Fix the timestamp written in the header
    pub fn with_generated_at(mut self, at: DateTime<Local>) -> Self {
        self.generated_at = at;
        self
    }

    fn expect_phase(&self, operation: &'static str, allowed: &[Phase]) -> Result<(), DacpacDiffError> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(DacpacDiffError::ScriptState {
                operation,
                state: self.phase.name(),
            })
        }
    }

    /// Script comment and state-tracking helpers
    pub fn write_header(&mut self, current: &str, target: &str) -> Result<(), DacpacDiffError> {
        self.expect_phase("write the header", &[Phase::Start])?;

        let stamp = self.generated_at.format("%Y-%m-%d %H:%M:%S");
        let sb = &mut self.sb;
        sb.append_line(&format!("-- Delta script generated by dacpac-diff at {}", stamp))
            .append_line(&format!("-- Current: {}", current))
            .append_line(&format!("-- Target: {}", target))
            .append_line("")
            .append_line("SET NOCOUNT ON")
            .append_line("SET XACT_ABORT ON")
            .append_line("GO")
            .append_line("")
            .append_line(&format!("EXEC sp_set_session_context {}, 1", ACTIVE_KEY))
            .append_line("GO")
            .append_line("IF OBJECT_ID('dbo.tmpIsActive') IS NOT NULL DROP FUNCTION dbo.tmpIsActive")
            .append_line("GO")
            .append_line("CREATE FUNCTION dbo.tmpIsActive() RETURNS BIT AS BEGIN")
            .append_line(&format!(
                "    RETURN ISNULL(CONVERT(BIT, SESSION_CONTEXT({})), 0)",
                ACTIVE_KEY
            ))
            .append_line("END")
            .append_line("GO")
            .append_line("CREATE PROCEDURE #print @level INT, @message NVARCHAR(MAX) AS")
            .append_line("    SET NOCOUNT ON")
            .append_line("    IF (@level > 0) RAISERROR(@message, 10, 1) WITH NOWAIT")
            .append_line("    ELSE PRINT @message")
            .append_line("GO")
            .append_line("CREATE PROCEDURE #usp_CheckState @step INT AS")
            .append_line("    SET NOCOUNT ON")
            .append_line("    IF (dbo.tmpIsActive() = 0) RETURN")
            .append_line("    IF (@step = 1 AND @@TRANCOUNT > 0) OR (@step = 2 AND @@TRANCOUNT = 0) BEGIN")
            .append_line(&format!("        EXEC sp_set_session_context {}, 0", ACTIVE_KEY))
            .append_line("        EXEC #print 1, '[ERROR] Change failed; no further changes will be applied'")
            .append_line("        IF (@@TRANCOUNT > 0) ROLLBACK")
            .append_line("    END")
            .append_line("GO")
            .append_line("");

        self.phase = Phase::Header;
        Ok(())
    }

    /// One change, numbered and titled
    pub fn write_block<T: MssqlDiffBlock>(&mut self, block: &T) -> Result<(), DacpacDiffError> {
        self.expect_phase("write a block", &[Phase::Header, Phase::Blocks])?;

        self.blocks += 1;
        self.sb
            .append_line(&format!("-- [{}] {}", self.blocks, block.diff().title()));
        block.format(&mut self.sb)?;
        self.sb.append_line("");

        self.phase = Phase::Blocks;
        Ok(())
    }

    /// Outcome report and removal of the helpers
    pub fn write_footer(&mut self) -> Result<(), DacpacDiffError> {
        self.expect_phase("write the footer", &[Phase::Header, Phase::Blocks])?;

        self.sb
            .append_line("SET NOEXEC OFF")
            .append_line("GO")
            .append_line("IF (dbo.tmpIsActive() = 1) EXEC #print 0, '[SUCCESS] All changes applied'")
            .append_line("ELSE EXEC #print 1, '[FAILURE] Script stopped before completion'")
            .append_line("GO")
            .append_line("DROP FUNCTION dbo.tmpIsActive")
            .append_line(&format!("EXEC sp_set_session_context {}, NULL", ACTIVE_KEY))
            .append_line("GO");

        self.phase = Phase::Footer;
        Ok(())
    }

    /// Number of blocks written so far
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// The finished script; the writer cannot be used afterwards
    pub fn finish(&mut self) -> Result<String, DacpacDiffError> {
        self.expect_phase("finish", &[Phase::Footer])?;
        self.phase = Phase::Done;
        let options = *self.sb.options();
        Ok(std::mem::replace(&mut self.sb, SqlScriptBuilder::new(options)).finish())
    }
}

/// Write a whole script for a list of changes
pub fn write_script<'a, I>(
    options: OutputOptions,
    current: &str,
    target: &str,
    changes: I,
) -> Result<String, DacpacDiffError>
where
    I: IntoIterator<Item = Difference<'a>>,
{
    let mut writer = MssqlScriptWriter::new(options);
    writer.write_header(current, target)?;
    for change in changes {
        writer.write_block(&DiffBlock::new(change))?;
    }
    writer.write_footer()?;
    tracing::debug!(blocks = writer.block_count(), "Script written");
    writer.finish()
}
