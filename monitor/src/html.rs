//! Hidden form field extraction from login pages.
//!
//! The login flow needs the `value` of named `<input>` elements (CSRF tokens,
//! OIDC codes). Lookup is a depth-first, first-match search over any tree that
//! implements [`FormNode`], so it can be exercised with synthetic trees as
//! well as documents parsed by `scraper`.

use scraper::{ElementRef, Html};
use thiserror::Error;

/// Errors raised when a required form field cannot be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// No element carries the requested `name` attribute.
    #[error("cannot find element {0}")]
    ElementNotFound(String),

    /// The element exists but has no `value` attribute.
    #[error("cannot find value of element {0}")]
    MissingValue(String),
}

/// An element in a document tree.
pub trait FormNode: Sized {
    /// Returns the value of the attribute `key`, if present.
    fn attribute(&self, key: &str) -> Option<&str>;

    /// Returns the element children in document order.
    fn child_nodes(&self) -> Vec<Self>;
}

impl<'a> FormNode for ElementRef<'a> {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.value().attr(key)
    }

    fn child_nodes(&self) -> Vec<Self> {
        self.children().filter_map(ElementRef::wrap).collect()
    }
}

/// Finds the first element, depth-first, whose `name` attribute equals `name`.
pub fn find_by_name<N: FormNode + Clone>(node: &N, name: &str) -> Option<N> {
    if node.attribute("name") == Some(name) {
        return Some(node.clone());
    }
    node.child_nodes()
        .iter()
        .find_map(|child| find_by_name(child, name))
}

/// Returns the `value` attribute of the first element named `name`.
///
/// # Errors
///
/// [`ExtractError::ElementNotFound`] if no element matches,
/// [`ExtractError::MissingValue`] if the match has no `value`.
pub fn find_field_value<N: FormNode + Clone>(root: &N, name: &str) -> Result<String, ExtractError> {
    let element =
        find_by_name(root, name).ok_or_else(|| ExtractError::ElementNotFound(name.to_string()))?;
    element
        .attribute("value")
        .map(str::to_string)
        .ok_or_else(|| ExtractError::MissingValue(name.to_string()))
}

/// A parsed HTML page.
pub struct HtmlPage {
    document: Html,
}

impl HtmlPage {
    /// Parses a full HTML document. Malformed markup is recovered, never rejected.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        Self {
            document: Html::parse_document(body),
        }
    }

    /// Returns the `value` of the first element named `name`.
    ///
    /// # Errors
    ///
    /// See [`find_field_value`].
    pub fn field_value(&self, name: &str) -> Result<String, ExtractError> {
        find_field_value(&self.document.root_element(), name)
    }

    /// Returns `true` if any element is named `name`.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        find_by_name(&self.document.root_element(), name).is_some()
    }
}
