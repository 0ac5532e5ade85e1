//! Import handler pipeline.
//!
//! Handlers intercept specific import paths before normal resolution and can
//! supply content directly, e.g. built-in testing libraries that exist in no
//! package and on no disk.
//!
//! # Example
//!
//! ```ignore
//! struct Forge;
//!
//! #[async_trait]
//! impl ImportHandler for Forge {
//!     fn name(&self) -> &str { "forge-std" }
//!     fn pattern(&self) -> &HandlerPattern { &self.pattern }
//!     async fn handle(&self, _ctx: &ImportHandlerContext<'_>) -> ImportHandlerResult {
//!         ImportHandlerResult::handled(FORGE_TEST_SOL)
//!     }
//! }
//! ```

pub mod builtin;

use async_trait::async_trait;
use regex_lite::Regex;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// How a handler selects import paths.
#[derive(Debug, Clone)]
pub enum HandlerPattern {
    Exact(String),
    /// `*`-glob over the whole import path.
    Glob(glob::Pattern),
    Regex(Regex),
}

impl HandlerPattern {
    #[must_use]
    pub fn exact(path: impl Into<String>) -> Self {
        Self::Exact(path.into())
    }

    /// # Errors
    /// Returns an error if the glob is malformed.
    pub fn glob(pattern: &str) -> Result<Self, glob::PatternError> {
        glob::Pattern::new(pattern).map(Self::Glob)
    }

    /// # Errors
    /// Returns an error if the regex is malformed.
    pub fn regex(pattern: &str) -> Result<Self, regex_lite::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    #[must_use]
    pub fn matches(&self, import: &str) -> bool {
        match self {
            Self::Exact(path) => path == import,
            Self::Glob(pattern) => pattern.matches_with(
                import,
                glob::MatchOptions {
                    case_sensitive: true,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                },
            ),
            Self::Regex(re) => re.is_match(import),
        }
    }
}

impl fmt::Display for HandlerPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(path) => f.write_str(path),
            Self::Glob(pattern) => write!(f, "glob:{}", pattern.as_str()),
            Self::Regex(re) => write!(f, "regex:{}", re.as_str()),
        }
    }
}

/// What a handler sees about the import being resolved.
#[derive(Debug, Clone, Copy)]
pub struct ImportHandlerContext<'a> {
    pub import_path: &'a str,
    /// Bundle path of the importing file.
    pub importer: &'a str,
}

/// A handler's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportHandlerResult {
    /// Use `content` as-is. `resolved_path` names the bundle entry; the import
    /// path is used when absent.
    Handled {
        content: String,
        resolved_path: Option<String>,
    },
    /// Pass to the next handler.
    Unhandled,
}

impl ImportHandlerResult {
    #[must_use]
    pub fn handled(content: impl Into<String>) -> Self {
        Self::Handled {
            content: content.into(),
            resolved_path: None,
        }
    }

    #[must_use]
    pub fn handled_at(content: impl Into<String>, resolved_path: impl Into<String>) -> Self {
        Self::Handled {
            content: content.into(),
            resolved_path: Some(resolved_path.into()),
        }
    }
}

/// Interceptor for a set of import paths.
#[async_trait]
pub trait ImportHandler: Send + Sync {
    fn name(&self) -> &str;

    fn pattern(&self) -> &HandlerPattern;

    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn can_handle(&self, import_path: &str) -> bool {
        self.pattern().matches(import_path)
    }

    async fn handle(&self, ctx: &ImportHandlerContext<'_>) -> ImportHandlerResult;
}

/// Content produced by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledImport {
    pub handler: String,
    pub path: String,
    pub content: String,
}

/// Ordered set of handlers, highest priority first.
///
/// Handlers of equal priority keep their registration order.
#[derive(Default)]
pub struct ImportHandlerRegistry {
    handlers: RwLock<Vec<Arc<dyn ImportHandler>>>,
}

impl ImportHandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in handlers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_builtins(&registry);
        registry
    }

    pub fn register(&self, handler: Arc<dyn ImportHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            debug!(handler = handler.name(), pattern = %handler.pattern(), priority = handler.priority(), "Registering import handler");
            handlers.push(handler);
            handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
        }
    }

    /// Remove every handler called `name`. Returns how many were removed.
    pub fn unregister(&self, name: &str) -> usize {
        let Ok(mut handlers) = self.handlers.write() else {
            return 0;
        };
        let before = handlers.len();
        handlers.retain(|h| h.name() != name);
        before - handlers.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of handlers whose pattern matches, in evaluation order.
    #[must_use]
    pub fn matching(&self, import_path: &str) -> Vec<String> {
        self.candidates(import_path)
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    fn candidates(&self, import_path: &str) -> Vec<Arc<dyn ImportHandler>> {
        self.handlers
            .read()
            .map(|handlers| {
                handlers
                    .iter()
                    .filter(|h| h.can_handle(import_path))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run matching handlers in order until one handles the import.
    pub async fn resolve(&self, ctx: &ImportHandlerContext<'_>) -> Option<HandledImport> {
        for handler in self.candidates(ctx.import_path) {
            match handler.handle(ctx).await {
                ImportHandlerResult::Handled {
                    content,
                    resolved_path,
                } => {
                    debug!(handler = handler.name(), import = ctx.import_path, "Import handled");
                    return Some(HandledImport {
                        handler: handler.name().to_string(),
                        path: resolved_path.unwrap_or_else(|| ctx.import_path.to_string()),
                        content,
                    });
                }
                ImportHandlerResult::Unhandled => {
                    debug!(handler = handler.name(), import = ctx.import_path, "Handler passed");
                }
            }
        }
        None
    }
}

/// Handler returning fixed content for one pattern.
pub struct StaticHandler {
    name: String,
    pattern: HandlerPattern,
    priority: i32,
    result: ImportHandlerResult,
}

impl StaticHandler {
    #[must_use]
    pub fn new(name: impl Into<String>, pattern: HandlerPattern, result: ImportHandlerResult) -> Self {
        Self {
            name: name.into(),
            pattern,
            priority: 0,
            result,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl ImportHandler for StaticHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> &HandlerPattern {
        &self.pattern
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle(&self, _ctx: &ImportHandlerContext<'_>) -> ImportHandlerResult {
        self.result.clone()
    }
}
