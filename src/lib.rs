//! Expand `#define`/`#macro` text macros in annotated templates.
//!
//! A template such as `module.pyx.cm` is expanded into `module.pyx`: the
//! definitions are removed and every plain-code use of a macro name is
//! replaced by its body. Strings and comments are never touched.
//!
//! ```text
//! #define LIMIT 1024
//! #macro CHECK:
//!     if n > LIMIT:
//!         raise ValueError(n)
//! #endmacro
//!
//! def push(n):
//!     CHECK
//! ```

mod error;
mod generator;
pub mod locator;
pub mod parser;
pub mod scanner;
pub mod substitute;
mod table;

pub use error::{Error, Result};
pub use generator::{FileExpander, GroupExpander, N_HEADER_LINES};
pub use table::{Macro, MacroTable};

use std::path::{Path, PathBuf};

/// File naming conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Extension marking a template, without the dot.
    pub template_suffix: String,
    /// `(source extension, interface extension)` pairs. The interface
    /// template of a source shares its macro namespace.
    pub companions: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            template_suffix: "cm".into(),
            companions: vec![("pyx".into(), "pxd".into())],
        }
    }
}

impl Config {
    pub fn is_template(&self, path: &Path) -> bool {
        self.output_path(path).is_some()
    }

    /// `dir/name.pyx.cm` to `dir/name.pyx`.
    pub fn output_path(&self, template: &Path) -> Option<PathBuf> {
        let name = template.file_name()?.to_str()?;
        let stem = name
            .strip_suffix(self.template_suffix.as_str())?
            .strip_suffix('.')?;

        if stem.is_empty() {
            None
        } else {
            Some(template.with_file_name(stem))
        }
    }

    /// `dir/name.pyx.cm` to `dir/name.pxd.cm`, whether or not it exists.
    pub fn companion(&self, template: &Path) -> Option<PathBuf> {
        let output = self.output_path(template)?;
        let ext = output.extension()?.to_str()?;
        let (_, companion_ext) = self.companions.iter().find(|(from, _)| from == ext)?;

        let companion = output.with_extension(companion_ext);
        let name = companion.file_name()?.to_str()?;
        Some(companion.with_file_name(format!("{name}.{}", self.template_suffix)))
    }
}
