//! Dacpac loading

mod model_xml;
mod reader;

use std::path::Path;

use crate::error::DacpacDiffError;
use crate::model::DatabaseModel;

pub use model_xml::{parse_model_xml, split_name};
pub use reader::DacpacContents;

/// Load the schema model stored in a dacpac file
pub fn load_dacpac(path: &Path) -> Result<DatabaseModel, DacpacDiffError> {
    let contents = DacpacContents::from_path(path)?;
    let xml = contents
        .get_text("model.xml")
        .ok_or_else(|| DacpacDiffError::ModelXmlError {
            path: path.to_path_buf(),
            message: "dacpac has no model.xml".to_string(),
        })?;
    parse_model_xml(&xml, contents.path())
}
