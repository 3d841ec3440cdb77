//! Script output
//!
//! [`SqlFileBuilder`] is the text sink every formatter writes to. Text is
//! built with `\n` line breaks and converted to CRLF on
//! [`finish`](SqlScriptBuilder::finish) when line endings are standardised.

pub mod mssql;

use crate::util::standardise_line_endings;

/// Options that change how a script is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// Write statement wrappers one per line instead of joined with `; `
    pub pretty_print: bool,
    /// Leave out the guards that stop a change from destroying data
    pub disable_dataloss_check: bool,
    /// Convert every line ending of the final script to CRLF
    pub standardise_line_endings: bool,
}

/// Append-only SQL text builder
pub trait SqlFileBuilder {
    fn options(&self) -> &OutputOptions;

    fn push_str(&mut self, text: &str);

    /// Text written so far
    fn as_str(&self) -> &str;

    fn append(&mut self, text: &str) -> &mut Self {
        self.push_str(text);
        self
    }

    fn append_line(&mut self, text: &str) -> &mut Self {
        self.push_str(text);
        self.push_str("\n");
        self
    }

    /// Append text that is only built when `condition` holds
    fn append_if<F>(&mut self, text: F, condition: bool) -> &mut Self
    where
        F: FnOnce() -> String,
    {
        if condition {
            self.push_str(&text());
        }
        self
    }

    fn append_line_if<F>(&mut self, text: F, condition: bool) -> &mut Self
    where
        F: FnOnce() -> String,
    {
        if condition {
            self.append_line(&text());
        }
        self
    }

    /// Start a new line unless the text already ends with one
    fn ensure_line(&mut self) -> &mut Self {
        let text = self.as_str();
        if !text.is_empty() && !text.ends_with('\n') && !text.ends_with('\r') {
            self.push_str("\n");
        }
        self
    }
}

/// [`SqlFileBuilder`] collecting the script in memory
#[derive(Debug, Clone, Default)]
pub struct SqlScriptBuilder {
    options: OutputOptions,
    sql: String,
}

impl SqlScriptBuilder {
    pub fn new(options: OutputOptions) -> Self {
        Self {
            options,
            sql: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// The finished script
    pub fn finish(self) -> String {
        if self.options.standardise_line_endings {
            standardise_line_endings(&self.sql, "\r\n")
        } else {
            self.sql
        }
    }
}

impl SqlFileBuilder for SqlScriptBuilder {
    fn options(&self) -> &OutputOptions {
        &self.options
    }

    fn push_str(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn as_str(&self) -> &str {
        &self.sql
    }
}
