//! LDE Term Expander
//!
//! The pure half of resolution: turning one compacted linked document into
//! its canonical expanded form.
//!
//! # Core Operations
//!
//! - **Expand**: merge contexts, expand keys and values to absolute IRIs
//! - **Canonicalize**: compact-for-storage and expand-for-consumption passes
//! - **Select language**: pick the best BCP-47 match from tagged values
//!
//! # Architecture
//!
//! ```text
//! compacted node → TermContext (builtin + @context) → Expander → Expanded { document, embeds }
//!                        ↑
//!                 ContextRegistry (remote contexts, registered by the caller)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use lde_expand::{ContextRegistry, Expander};
//!
//! let registry = ContextRegistry::new();
//! let expanded = Expander::default().expand(&node.content, &registry)?;
//! for embed in &expanded.embeds {
//!     // fetch embed.target, expand it, then Expander::splice
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod canonical;
pub mod context;
pub mod error;
pub mod expander;
pub mod language;

pub use canonical::{compact_for_storage, compact_keys, expand_for_consumption};
pub use context::{Container, ContextRegistry, TermContext, TermDefinition, BUILTIN_CONTEXT};
pub use error::{ExpandError, ExpandResult};
pub use expander::{delanguage, dereference, Embed, ExpandOptions, Expanded, Expander};
pub use language::{more_generic, select_language, select_text};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use lde_document::vocab::REPROLIB_CANONICAL;
    use serde_json::json;

    #[test]
    fn stored_form_expands_like_authored_form() {
        let authored = json!({
            "@context": BUILTIN_CONTEXT,
            "@type": "http://schema.repronim.org/Activity",
            "prefLabel": {"en": "Mood", "fr": "Humeur"},
            "order": ["items/q1"],
        });
        let stored = compact_for_storage(&authored);
        assert_eq!(stored["@type"], json!("reprolib:Activity"));

        let registry = ContextRegistry::new();
        let expander = Expander::default();
        let a = expander.expand(authored.as_object().unwrap(), &registry).unwrap();
        let b = expander.expand(stored.as_object().unwrap(), &registry).unwrap();
        assert_eq!(a, b);

        let label = &a.document["http://www.w3.org/2004/02/skos/core#prefLabel"];
        assert_eq!(select_text(label, "fr-CA"), Some("Humeur"));
        assert!(a.document.contains_key(&format!("{REPROLIB_CANONICAL}terms/order")));
    }

    #[test]
    fn compacted_keys_expand_through_generated_context() {
        let doc = json!({"https://x.org/terms/score": 4});
        let compacted = compact_keys(doc.as_object().unwrap());
        let out = Expander::default()
            .expand(&compacted, &ContextRegistry::new())
            .unwrap();
        assert_eq!(out.document["https://x.org/terms/score"], json!([{"@value": 4}]));
    }
}
