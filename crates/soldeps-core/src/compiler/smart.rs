//! Compiler adapter that resolves imports before compiling.

use super::{Compiler, CompilerError, CompilerInput, CompilerOutput};
use crate::error::ResolveError;
use crate::resolver::{DependencyResolver, DependencyTree};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wraps a compiler with dependency resolution.
///
/// Sources passed in always win over resolved files of the same path. When
/// the resolver fails as a whole, the wrapped compiler still runs on the
/// original sources.
pub struct SmartCompiler<C> {
    resolver: DependencyResolver,
    compiler: C,
}

impl<C: Compiler> SmartCompiler<C> {
    #[must_use]
    pub fn new(resolver: DependencyResolver, compiler: C) -> Self {
        Self { resolver, compiler }
    }

    #[must_use]
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    #[must_use]
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Resolve `input.target` and merge the bundle with `input.sources`.
    ///
    /// The resolution index is saved before returning; a failed save is logged
    /// and does not fail the preparation.
    ///
    /// # Errors
    /// Returns an error if the resolution pass fails as a whole.
    pub async fn prepare(
        &self,
        input: &CompilerInput,
    ) -> Result<(CompilerInput, Arc<DependencyTree>), ResolveError> {
        let tree = self
            .resolver
            .build_dependency_tree_with_sources(&input.target, input.source_map())
            .await?;

        if let Err(e) = self.resolver.save_resolution_index().await {
            warn!(error = %e, "Resolution index not saved");
        }

        let mut merged = tree.to_compiler_input();
        for (path, source) in &input.sources {
            merged.sources.insert(path.clone(), source.clone());
        }
        merged.target.clone_from(&input.target);

        debug!(
            entry = %input.target,
            sources = merged.sources.len(),
            unresolved = tree.diagnostics().len(),
            "Prepared compiler input"
        );
        Ok((merged, tree))
    }
}

#[async_trait]
impl<C: Compiler> Compiler for SmartCompiler<C> {
    fn name(&self) -> &str {
        self.compiler.name()
    }

    async fn compile(&self, input: CompilerInput) -> Result<CompilerOutput, CompilerError> {
        match self.prepare(&input).await {
            Ok((merged, _tree)) => self.compiler.compile(merged).await,
            Err(e) => {
                warn!(
                    entry = %input.target,
                    error = %e,
                    "Dependency resolution failed, compiling original sources"
                );
                self.compiler.compile(input).await
            }
        }
    }
}
