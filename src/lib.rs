//! dacpac-diff: SQL Server schema comparison and delta script generation
//!
//! This library compares two database schemas loaded from `.dacpac` files
//! and writes a T-SQL script that moves the current schema to the target,
//! one guarded transaction per change.

pub mod dacpac;
pub mod diff;
pub mod error;
pub mod model;
pub mod output;
pub mod util;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

pub use diff::{diff_models, Difference, ExclusionRules};
pub use error::DacpacDiffError;
pub use model::DatabaseModel;
pub use output::OutputOptions;

/// Options for comparing two dacpacs
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Dacpac describing the schema as it is now
    pub current_path: PathBuf,
    /// Dacpac describing the desired schema
    pub target_path: Option<PathBuf>,
    /// File to write the script to (stdout when None)
    pub output_path: Option<PathBuf>,
    /// There is no current schema; the only dacpac given is the target
    pub new: bool,
    /// Schemas to leave out of the comparison
    pub exclude_schemas: Vec<String>,
    /// Full-name patterns (with `*` wildcards) of objects to leave out
    pub exclude_objects: Vec<String>,
    pub output: OutputOptions,
}

impl DiffOptions {
    /// Paths of the current (None when new) and target dacpacs
    fn resolve_paths(&self) -> Result<(Option<&Path>, &Path)> {
        match (&self.target_path, self.new) {
            (Some(target), false) => Ok((Some(self.current_path.as_path()), target.as_path())),
            (Some(_), true) => {
                bail!("Only one dacpac may be given when comparing against a new database")
            }
            (None, true) => Ok((None, self.current_path.as_path())),
            (None, false) => bail!("A target dacpac is required unless --new is given"),
        }
    }
}

/// Generate the delta script described by `options`
pub fn generate_script(options: &DiffOptions) -> Result<String> {
    let (current_path, target_path) = options.resolve_paths()?;
    let rules = ExclusionRules::new(&options.exclude_schemas, &options.exclude_objects)?;

    let current = match current_path {
        Some(path) => dacpac::load_dacpac(path)?,
        None => empty_database()?,
    };
    let target = dacpac::load_dacpac(target_path)?;

    let current_label = current_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(new database)".to_string());
    script_for_models(
        &current,
        &target,
        &rules,
        options.output,
        &current_label,
        &target_path.display().to_string(),
    )
}

/// Model of a freshly created database, which already owns `dbo`
fn empty_database() -> Result<DatabaseModel> {
    let mut db = DatabaseModel::new();
    db.add_schema("dbo")?;
    Ok(db)
}

/// Diff two loaded models and write the script
pub fn script_for_models(
    current: &DatabaseModel,
    target: &DatabaseModel,
    rules: &ExclusionRules,
    output: OutputOptions,
    current_label: &str,
    target_label: &str,
) -> Result<String> {
    let changes = diff_models(current, target, rules)?;
    let script = output::mssql::write_script(output, current_label, target_label, changes)?;
    Ok(script)
}

/// Generate the script and write it to the configured output (or stdout)
pub fn compare_dacpacs(options: &DiffOptions) -> Result<()> {
    let script = generate_script(options)?;

    match &options.output_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| DacpacDiffError::OutputWriteError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(path, &script).map_err(|e| DacpacDiffError::OutputWriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
            tracing::info!(path = %path.display(), "Wrote delta script");
        }
        None => print!("{}", script),
    }

    Ok(())
}
