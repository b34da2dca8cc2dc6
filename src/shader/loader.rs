//! Include Loaders
//!
//! The preprocessor never touches the file system. It asks an
//! [`IncludeLoader`] for each requested path:
//!
//! | Loader | Source |
//! |--------|--------|
//! | [`MemoryLoader`] | In-memory virtual files |
//! | [`DirectoryLoader`] | Files under a base directory, with a content cache |
//! | [`EmbeddedLoader`] | Built-in GLSL chunks compiled into the binary |
//! | `Fn(&str, &mut String) -> bool` | Any closure |

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;

/// Resolves include paths to source text.
pub trait IncludeLoader: Send + Sync {
    /// Appends the contents of `path` to `out`. Returns `false` if the file
    /// cannot be provided.
    fn load(&self, path: &str, out: &mut String) -> bool;
}

impl<F> IncludeLoader for F
where
    F: Fn(&str, &mut String) -> bool + Send + Sync,
{
    #[inline]
    fn load(&self, path: &str, out: &mut String) -> bool {
        self(path, out)
    }
}

// ─── MemoryLoader ─────────────────────────────────────────────────────────────

/// Virtual files held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: FxHashMap<String, String>,
}

impl MemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.files.insert(path.into(), source.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl IncludeLoader for MemoryLoader {
    fn load(&self, path: &str, out: &mut String) -> bool {
        match self.files.get(path) {
            Some(source) => {
                out.push_str(source);
                true
            }
            None => false,
        }
    }
}

// ─── DirectoryLoader ──────────────────────────────────────────────────────────

/// Loads files relative to a base directory and caches their contents.
///
/// Paths that are absolute or climb out of the base directory are refused.
#[derive(Debug)]
pub struct DirectoryLoader {
    base: PathBuf,
    cache: RwLock<FxHashMap<String, Arc<str>>>,
}

impl DirectoryLoader {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Forgets cached contents, e.g. after files changed on disk.
    pub fn invalidate(&self) {
        self.cache.write().clear();
    }

    #[must_use]
    pub fn cached_files(&self) -> usize {
        self.cache.read().len()
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.base.join(relative))
    }
}

impl IncludeLoader for DirectoryLoader {
    fn load(&self, path: &str, out: &mut String) -> bool {
        if let Some(source) = self.cache.read().get(path) {
            out.push_str(source);
            return true;
        }

        let Some(full) = self.resolve(path) else {
            debug!("Refusing include path outside {}: {path}", self.base.display());
            return false;
        };

        match std::fs::read_to_string(&full) {
            Ok(source) => {
                out.push_str(&source);
                self.cache.write().insert(path.to_string(), source.into());
                true
            }
            Err(e) => {
                debug!("Failed to read include {}: {e}", full.display());
                false
            }
        }
    }
}

// ─── EmbeddedLoader ───────────────────────────────────────────────────────────

#[derive(RustEmbed)]
#[folder = "src/shaders/chunks"]
struct ShaderChunks;

/// Built-in GLSL chunks (`common`, `lighting`, ...).
///
/// A missing `.glsl` extension is added. Debug builds read the chunk from
/// the source tree first so edits apply without recompiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedLoader;

impl EmbeddedLoader {
    /// Names of the embedded chunk files.
    pub fn chunk_names() -> impl Iterator<Item = Cow<'static, str>> {
        ShaderChunks::iter()
    }
}

impl IncludeLoader for EmbeddedLoader {
    fn load(&self, path: &str, out: &mut String) -> bool {
        let filename = if Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("glsl"))
        {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("{path}.glsl"))
        };

        #[cfg(debug_assertions)]
        {
            let disk = Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("src/shaders/chunks")
                .join(filename.as_ref());
            if let Ok(source) = std::fs::read_to_string(&disk) {
                out.push_str(&source);
                return true;
            }
        }

        if let Some(file) = ShaderChunks::get(&filename)
            && let Ok(source) = std::str::from_utf8(file.data.as_ref())
        {
            out.push_str(source);
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_appends() {
        let loader = MemoryLoader::new().with_file("a.glsl", "float a;");
        let mut out = String::from("// ");
        assert!(loader.load("a.glsl", &mut out));
        assert_eq!(out, "// float a;");
        assert!(!loader.load("b.glsl", &mut out));
    }

    #[test]
    fn directory_loader_refuses_escaping_paths() {
        let loader = DirectoryLoader::new("shaders");
        assert!(loader.resolve("../secret.glsl").is_none());
        assert!(loader.resolve("/etc/passwd").is_none());
        assert_eq!(
            loader.resolve("lib/common.glsl"),
            Some(PathBuf::from("shaders/lib/common.glsl"))
        );
    }

    #[test]
    fn embedded_chunks_resolve_with_or_without_extension() {
        let mut with_ext = String::new();
        let mut without_ext = String::new();
        assert!(EmbeddedLoader.load("common.glsl", &mut with_ext));
        assert!(EmbeddedLoader.load("common", &mut without_ext));
        assert_eq!(with_ext, without_ext);
        assert!(!EmbeddedLoader.load("missing_chunk", &mut String::new()));
    }
}
