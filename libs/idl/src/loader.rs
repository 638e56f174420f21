//! Locating and loading IDL modules from disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::Document;
use crate::error::IdlError;
use crate::parser::parse_document;

/// File extension of IDL documents.
pub const IDL_EXTENSION: &str = "thrift";

/// A loaded module plus every document it includes, transitively.
#[derive(Debug, Clone)]
pub struct Program {
    root: Document,
    includes: HashMap<String, Document>,
}

impl Program {
    /// Wrap a single parsed document.
    pub fn from_document(root: Document) -> Self {
        Self {
            root,
            includes: HashMap::new(),
        }
    }

    /// Add an included document, keyed by its module name.
    pub fn with_include(mut self, document: Document) -> Self {
        self.includes.insert(document.name.clone(), document);
        self
    }

    /// The module that was requested.
    pub fn root(&self) -> &Document {
        &self.root
    }

    /// Find a document by module name.
    pub fn document(&self, module: &str) -> Option<&Document> {
        if self.root.name == module {
            Some(&self.root)
        } else {
            self.includes.get(module)
        }
    }

    /// Resolve a possibly qualified name (`Name` or `module.Name`) as seen
    /// from `scope`, returning the defining document and the local name.
    pub fn scope_of<'a>(
        &'a self,
        scope: &'a Document,
        name: &'a str,
    ) -> Option<(&'a Document, &'a str)> {
        match name.rsplit_once('.') {
            Some((module, local)) => self.document(module).map(|doc| (doc, local)),
            None => Some((scope, name)),
        }
    }
}

/// Loads `<module>.thrift` files from a list of directories.
#[derive(Debug, Clone)]
pub struct IdlLoader {
    search_paths: Vec<PathBuf>,
}

impl IdlLoader {
    /// Create a loader over the given directories, searched in order.
    pub fn new<I, P>(search_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the file for `module`: the exact name first, then lowercase.
    pub fn find_module(&self, module: &str) -> Result<PathBuf, IdlError> {
        let mut file_names = vec![format!("{}.{}", module, IDL_EXTENSION)];
        let lower = module.to_lowercase();
        if lower != module {
            file_names.push(format!("{}.{}", lower, IDL_EXTENSION));
        }

        let mut searched = Vec::new();
        for dir in &self.search_paths {
            for file_name in &file_names {
                let path = dir.join(file_name);
                if path.is_file() {
                    return Ok(path);
                }
                searched.push(path);
            }
        }

        Err(IdlError::ModuleNotFound {
            module: module.to_string(),
            searched,
        })
    }

    /// Load `module` and its includes.
    pub fn load(&self, module: &str) -> Result<Program, IdlError> {
        let path = self.find_module(module)?;
        let mut includes = HashMap::new();
        let mut stack = Vec::new();
        let root = self.load_file(&path, &mut includes, &mut stack)?;
        Ok(Program { root, includes })
    }

    fn load_file(
        &self,
        path: &Path,
        includes: &mut HashMap<String, Document>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Document, IdlError> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if stack.contains(&canonical) {
            return Err(IdlError::IncludeCycle(canonical));
        }

        let source = fs::read_to_string(path).map_err(|source| IdlError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = module_name(path);
        let mut document = parse_document(&name, &path.display().to_string(), &source)?;
        document.path = Some(path.to_path_buf());

        debug!(
            module = %name,
            path = %path.display(),
            services = document.services.len(),
            "Loaded IDL document"
        );

        stack.push(canonical);
        for include in document.includes.clone() {
            let include_path = self.resolve_include(path, &include)?;
            let include_name = module_name(&include_path);
            if include_name == name || includes.contains_key(&include_name) {
                let include_canonical = include_path
                    .canonicalize()
                    .unwrap_or_else(|_| include_path.clone());
                if stack.contains(&include_canonical) {
                    return Err(IdlError::IncludeCycle(include_canonical));
                }
                continue;
            }
            let included = self.load_file(&include_path, includes, stack)?;
            includes.insert(include_name, included);
        }
        stack.pop();

        Ok(document)
    }

    /// Resolve an include relative to the including file, then the search path.
    fn resolve_include(&self, from: &Path, include: &str) -> Result<PathBuf, IdlError> {
        let base = from.parent().map(Path::to_path_buf).unwrap_or_default();
        std::iter::once(base)
            .chain(self.search_paths.iter().cloned())
            .map(|dir| dir.join(include))
            .find(|path| path.is_file())
            .ok_or_else(|| IdlError::IncludeNotFound {
                include: include.to_string(),
                from: from.to_path_buf(),
            })
    }
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
