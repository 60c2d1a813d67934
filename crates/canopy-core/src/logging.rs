//! Logging and debugging facilities for Canopy.
//!
//! This module provides:
//! - Target names for filtering the `tracing` output of each subsystem
//! - Debug visualization for scope trees
//! - Performance tracing hooks for profiling
//!
//! # Tracing Integration
//!
//! Canopy uses the `tracing` crate for instrumentation. Transitions and
//! attach/detach are logged at `debug`, subscriber notifications at `trace`
//! and stale bindings or ignored detaches at `warn`. To see logs, install a
//! tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("canopy_core::scope=debug,canopy::router=debug")
//!         .init();
//! }
//! ```
//!
//! # Debug Visualization
//!
//! Use [`ScopeTreeDebug`] to render the live scope tree:
//!
//! ```
//! use canopy_core::{ScopeLifecycle, logging::ScopeTreeDebug};
//!
//! let root = ScopeLifecycle::named("app");
//! let output = ScopeTreeDebug::new().format_subtree(root.id()).unwrap();
//! assert!(output.contains("app"));
//! ```

use std::fmt::{self, Write as FmtWrite};

use crate::error::ScopeResult;
use crate::scope::{global_registry, ScopeId, ScopeRegistry};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Scope tree structure and cascade.
    pub const SCOPE: &str = "canopy_core::scope";
    /// Lifecycle owner notifications.
    pub const LIFECYCLE: &str = "canopy_core::lifecycle";
    /// View state machine.
    pub const VIEW: &str = "canopy_core::view";
    /// Builders and dependency caches.
    pub const BUILDER: &str = "canopy_core::builder";
    /// Signal emission.
    pub const SIGNAL: &str = "canopy_core::signal";
    /// Router composition.
    pub const ROUTER: &str = "canopy::router";
    /// Performance spans.
    pub const PERF: &str = "canopy_core::perf";
}

/// Style options for scope tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Plain indentation.
    Compact,
}

/// Configuration for scope tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show scope IDs.
    pub show_ids: bool,
    /// Whether to show the active/inactive flag.
    pub show_state: bool,
    /// Whether to show the state of views bound into the tree.
    pub show_views: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_state: true,
            show_views: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_views: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            style: TreeStyle::Compact,
            show_ids: false,
            show_state: false,
            show_views: false,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing scope trees.
///
/// The tree is rendered from one consistent snapshot of the registry.
#[derive(Debug, Clone, Default)]
pub struct ScopeTreeDebug {
    options: TreeFormatOptions,
}

impl ScopeTreeDebug {
    /// Create a new debug visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a debug visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format every tree in the registry, root by root.
    pub fn format_all(&self) -> ScopeResult<String> {
        let _perf = PerfSpan::new("format_scope_tree");
        global_registry().with_read(|registry| {
            let roots: Vec<ScopeId> = registry.roots().collect();

            let mut output = String::new();
            let _ = writeln!(output, "Scope Tree ({} total scopes):", registry.scope_count());
            if roots.is_empty() {
                output.push_str("  (empty)\n");
            }
            for root in roots {
                self.format_into(registry, root, &mut Vec::new(), &mut output)?;
            }
            Ok(output)
        })
    }

    /// Format the subtree rooted at `root`.
    pub fn format_subtree(&self, root: ScopeId) -> ScopeResult<String> {
        global_registry().with_read(|registry| {
            let mut output = String::new();
            self.format_into(registry, root, &mut Vec::new(), &mut output)?;
            Ok(output)
        })
    }

    /// `lasts` holds, per ancestor level, whether that ancestor was the last
    /// of its siblings; its length is the current depth.
    fn format_into(
        &self,
        registry: &ScopeRegistry,
        id: ScopeId,
        lasts: &mut Vec<bool>,
        output: &mut String,
    ) -> ScopeResult<()> {
        let depth = lasts.len();
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        let name = registry.name(id)?;
        output.push_str(&self.build_prefix(lasts));
        output.push_str(if name.is_empty() { "(unnamed)" } else { name });

        if self.options.show_ids {
            let _ = write!(output, " [{id:?}]");
        }
        if self.options.show_state {
            let state = if registry.is_active(id)? {
                "active"
            } else {
                "inactive"
            };
            let _ = write!(output, " ({state})");
        }
        if self.options.show_views {
            if let Some(view) = registry.view(id)? {
                let _ = write!(output, " view={:?}", view.state());
            }
        }
        output.push('\n');

        let children = registry.children(id)?;
        for (i, &child) in children.iter().enumerate() {
            lasts.push(i + 1 == children.len());
            let result = self.format_into(registry, child, lasts, output);
            lasts.pop();
            result?;
        }
        Ok(())
    }

    /// Build the prefix string for a tree node.
    fn build_prefix(&self, lasts: &[bool]) -> String {
        let Some((&is_last, ancestors)) = lasts.split_last() else {
            return String::new();
        };

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "", ""),
        };
        let pad = " ".repeat(self.options.indent_size);

        let mut prefix = String::new();
        for &ancestor_is_last in ancestors {
            prefix.push_str(if ancestor_is_last { " " } else { branch });
            prefix.push_str(&pad);
        }
        if self.options.style == TreeStyle::Compact {
            prefix.push_str(&pad);
        } else {
            prefix.push_str(if is_last { corner } else { tee });
            prefix.push(' ');
        }
        prefix
    }
}

impl fmt::Display for ScopeTreeDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format_all() {
            Ok(output) => f.write_str(&output),
            Err(e) => write!(f, "Error formatting scope tree: {e}"),
        }
    }
}

/// A guard that keeps a tracing span entered until dropped.
///
/// This is useful for tracking the duration of operations.
#[derive(Debug)]
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation = name);
        Self {
            _span: span.entered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeLifecycle;
    use crate::view::ViewLifecycle;

    #[test]
    fn test_tree_format_all_header() {
        let _root = ScopeLifecycle::named("header_root");
        let output = ScopeTreeDebug::new().format_all().unwrap();
        assert!(output.starts_with("Scope Tree ("));
        assert!(output.contains("header_root"));
    }

    #[test]
    fn test_tree_format_hierarchy() {
        let root = ScopeLifecycle::named("app");
        let logged_out = ScopeLifecycle::named("logged_out");
        let logged_in = ScopeLifecycle::named("logged_in");
        let game = ScopeLifecycle::named("game");
        root.attach_child(&logged_out);
        root.attach_child(&logged_in);
        logged_in.attach_child(&game);
        root.activate();

        let options = TreeFormatOptions {
            show_ids: false,
            ..Default::default()
        };
        let output = ScopeTreeDebug::with_options(options)
            .format_subtree(root.id())
            .unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "app (active)",
                "\u{251c}\u{2500}\u{2500} logged_out (active)",
                "\u{2514}\u{2500}\u{2500} logged_in (active)",
                "   \u{2514}\u{2500}\u{2500} game (active)",
            ]
        );
    }

    #[test]
    fn test_tree_format_minimal_and_depth() {
        let root = ScopeLifecycle::named("top");
        let child = ScopeLifecycle::named("middle");
        let grandchild = ScopeLifecycle::named("bottom");
        root.attach_child(&child);
        child.attach_child(&grandchild);

        let options = TreeFormatOptions {
            max_depth: Some(1),
            ..TreeFormatOptions::minimal()
        };
        let output = ScopeTreeDebug::with_options(options)
            .format_subtree(root.id())
            .unwrap();

        assert_eq!(output, "top\n  middle\n");
    }

    #[test]
    fn test_tree_format_shows_views() {
        let scope = ScopeLifecycle::named("screen");
        let view = ViewLifecycle::named("screen");
        scope.set_view_lifecycle(&view);
        view.did_load();

        let output = ScopeTreeDebug::with_options(TreeFormatOptions::detailed())
            .format_subtree(scope.id())
            .unwrap();
        assert!(output.contains("view=Loaded"));
    }

    #[test]
    fn test_perf_span() {
        let _span = PerfSpan::new("test_operation");
    }
}
