use crate::{
    error::{Error, Result},
    parser, substitute,
    table::MacroTable,
    Config,
};
use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

/// Number of banner lines at the top of every generated file.
pub const N_HEADER_LINES: usize = 3;

fn banner(template: &Path) -> String {
    let name = template
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    format!(
        "# Generated by cymacro from {name}.
# Do not edit this file: edit the template and regenerate it.
#
"
    )
}

/// The table a run starts from: the caller's seeds, taken from `current`
/// the first time.
fn reseed(seeds: &mut Option<MacroTable>, current: &MacroTable) -> MacroTable {
    seeds.get_or_insert_with(|| current.clone()).clone()
}

/// A template and the file it expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    template: PathBuf,
    output: PathBuf,
}

impl Target {
    fn read(&self) -> Result<String> {
        let read_err = |source: io::Error| Error::Read {
            path: self.template.clone(),
            source,
        };

        let mut f = File::open(&self.template).map_err(read_err)?;
        let mut c = String::new();
        f.read_to_string(&mut c).map_err(read_err)?;
        Ok(c)
    }

    /// Read the template and merge its definitions into `table`.
    /// Returns the template text with the definitions removed.
    fn scan(&self, table: &mut MacroTable) -> Result<String> {
        let contents = self.read()?;
        let extraction = parser::extract(&contents).map_err(|e| e.in_template(&self.template))?;

        tracing::debug!(
            template = %self.template.display(),
            definitions = extraction.macros.len(),
            "scanned template"
        );

        table.extend(extraction.macros);
        Ok(extraction.code)
    }

    /// Expand `code` and prepend the banner.
    fn render(&self, code: &str, table: &MacroTable) -> Result<String> {
        let body = substitute::substitute(code, table).map_err(|e| e.in_template(&self.template))?;

        let mut contents = banner(&self.template);
        contents.push_str(&body);
        Ok(contents)
    }

    /// Replace the output with `contents`.
    ///
    /// The output is written to a temporary file next to it and renamed into
    /// place, so a failure never leaves a truncated file behind.
    fn persist(&self, contents: &str) -> Result<()> {
        let write_err = |source: io::Error| Error::Write {
            path: self.output.clone(),
            source,
        };

        let dir = match self.output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut f = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        f.write_all(contents.as_bytes()).map_err(write_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            f.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(write_err)?;
        }

        f.persist(&self.output).map_err(|e| write_err(e.error))?;

        tracing::info!(
            template = %self.template.display(),
            output = %self.output.display(),
            "expanded template"
        );

        Ok(())
    }

    fn clean(&self) -> Result<()> {
        match std::fs::remove_file(&self.output) {
            Ok(()) => {
                tracing::info!(output = %self.output.display(), "removed generated file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Remove {
                path: self.output.clone(),
                source,
            }),
        }
    }
}

/// Expands one template into one generated file.
#[derive(Debug, Clone)]
pub struct FileExpander {
    target: Target,
    seeds: Option<MacroTable>,

    /// Macros available to the expansion. Callers may seed it before the
    /// first call to [`FileExpander::expand`]; definitions found in the
    /// template are merged in, replacing seeded entries of the same name.
    ///
    /// Every run starts again from the seeds, so after a run this holds the
    /// seeds plus the definitions of the current template only.
    pub definitions: MacroTable,
}

impl FileExpander {
    /// Expand `template` into the same path without its template suffix.
    pub fn from_path(template: impl AsRef<Path>) -> Result<Self> {
        Self::from_path_with(template, &Config::default())
    }

    pub fn from_path_with(template: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let template = template.as_ref();
        let output = config
            .output_path(template)
            .ok_or_else(|| Error::NotATemplate {
                path: template.to_path_buf(),
                suffix: config.template_suffix.clone(),
            })?;

        Ok(Self::with_output(template, output))
    }

    pub fn with_output(template: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            target: Target {
                template: template.into(),
                output: output.into(),
            },
            seeds: None,
            definitions: MacroTable::new(),
        }
    }

    pub fn template(&self) -> &Path {
        &self.target.template
    }

    pub fn output(&self) -> &Path {
        &self.target.output
    }

    /// Read the template, collect its definitions and (re)write the output.
    pub fn expand(&mut self) -> Result<()> {
        self.definitions = reseed(&mut self.seeds, &self.definitions);

        let code = self.target.scan(&mut self.definitions)?;
        let contents = self.target.render(&code, &self.definitions)?;
        self.target.persist(&contents)
    }

    /// Remove the generated file. Succeeds if it does not exist.
    pub fn clean(&self) -> Result<()> {
        self.target.clean()
    }
}

/// Expands a set of related templates that share one macro namespace.
///
/// Each template source is grouped with its companion interface template
/// (`x.pxd.cm` for `x.pyx.cm` by default) when that file exists. All members
/// are scanned before any is written, companions first, so a definition in
/// any member is visible in all of them and definitions in a source override
/// those of its companion.
#[derive(Debug, Clone)]
pub struct GroupExpander {
    members: Vec<Target>,
    expanded_sources: Vec<PathBuf>,
    seeds: Option<MacroTable>,

    /// The namespace shared by every member. Seeded and reset the same way
    /// as [`FileExpander::definitions`].
    pub definitions: MacroTable,
}

impl GroupExpander {
    pub fn new<I, P>(sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self::with_config(sources, &Config::default())
    }

    pub fn with_config<I, P>(sources: I, config: &Config) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut members: Vec<Target> = Vec::new();
        let mut expanded_sources = Vec::new();

        for source in sources {
            let source = source.as_ref();
            let Some(output) = config.output_path(source) else {
                // not a template, left for the build tool as is
                expanded_sources.push(source.to_path_buf());
                continue;
            };

            let companion = config
                .companion(source)
                .filter(|c| c.is_file())
                .and_then(|c| config.output_path(&c).map(|o| (c, o)));

            let group = companion.into_iter().chain([(source.to_path_buf(), output.clone())]);
            for (template, output) in group {
                if !members.iter().any(|m| m.template == template) {
                    tracing::debug!(template = %template.display(), "group member");
                    members.push(Target { template, output });
                }
            }

            expanded_sources.push(output);
        }

        Self {
            members,
            expanded_sources,
            seeds: None,
            definitions: MacroTable::new(),
        }
    }

    /// Templates in expansion order.
    pub fn templates(&self) -> impl Iterator<Item = &Path> {
        self.members.iter().map(|m| m.template.as_path())
    }

    /// Every file this group writes.
    pub fn outputs(&self) -> impl Iterator<Item = &Path> {
        self.members.iter().map(|m| m.output.as_path())
    }

    /// Expand every member.
    ///
    /// No output is touched until every member has been expanded, so a
    /// failing member leaves the whole group as it was.
    ///
    /// Returns the source list with each template replaced by its output,
    /// ready to hand back to the build tool.
    pub fn expand(&mut self) -> Result<Vec<PathBuf>> {
        self.definitions = reseed(&mut self.seeds, &self.definitions);

        let mut codes = Vec::with_capacity(self.members.len());
        for member in self.members.iter() {
            codes.push(member.scan(&mut self.definitions)?);
        }

        let mut rendered = Vec::with_capacity(self.members.len());
        for (member, code) in self.members.iter().zip(codes.iter()) {
            rendered.push(member.render(code, &self.definitions)?);
        }

        for (member, contents) in self.members.iter().zip(rendered.iter()) {
            member.persist(contents)?;
        }

        Ok(self.expanded_sources.clone())
    }

    /// Remove every file this group writes.
    pub fn clean(&self) -> Result<()> {
        for member in self.members.iter() {
            member.clean()?;
        }
        Ok(())
    }
}
