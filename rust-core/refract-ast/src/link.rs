// SPDX-License-Identifier: PMPL-1.0-or-later
//! Cross-index link identities.

use std::fmt;

/// Sentinel index name for self-referential `#options` declarations.
///
/// A declaration against `this.index` is rewritten to the concrete index
/// resolved for its field after link assignment has run.
pub const SELF_SENTINEL: &str = "this.index";

/// Identifies a target index plus the field pair that maps documents in the
/// current index onto documents in the target.
///
/// Equality is by the `(index_name, left_field, right_field, alias)` tuple,
/// never by where the link came from. The local anchor link produced by
/// [`IndexLink::local`] marks "this same index" and is only meaningful as a
/// comparison anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexLink {
    /// Optional alias from the `#options` declaration.
    pub alias: Option<String>,
    /// Fully-qualified target index name.
    pub index_name: String,
    /// Field in the enclosing index; `None` for the local anchor.
    pub left_field: Option<String>,
    /// Field in the target index whose values map back to `left_field`.
    pub right_field: String,
}

impl IndexLink {
    /// The anchor link for the index a query is being rewritten against.
    ///
    /// Both fields are the index's primary key, so a pkey-to-pkey
    /// comparison against this link degenerates to a no-op join.
    pub fn local(index_name: impl Into<String>, key_field: impl Into<String>) -> Self {
        let key = key_field.into();
        IndexLink {
            alias: None,
            index_name: index_name.into(),
            left_field: Some(key.clone()),
            right_field: key,
        }
    }

    /// Whether this link was declared against the self sentinel and still
    /// needs its concrete index substituted.
    pub fn is_self_sentinel(&self) -> bool {
        self.index_name == SELF_SENTINEL
    }

    /// Whether this link relates a primary key to a primary key.
    pub fn is_pkey_to_pkey(&self, pkey: &str) -> bool {
        self.left_field.as_deref() == Some(pkey) && self.right_field == pkey
    }
}

impl fmt::Display for IndexLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{}:", alias)?;
        }
        write!(
            f,
            "{}=<{}>{}",
            self.left_field.as_deref().unwrap_or("_id"),
            self.index_name,
            self.right_field
        )
    }
}

/// A relationship declared in a query's `#options` directive.
///
/// `left_field=<index_name>right_field`, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDecl {
    pub alias: Option<String>,
    pub left_field: String,
    pub index_name: String,
    pub right_field: String,
}

impl LinkDecl {
    /// Materialize the declared relationship as an [`IndexLink`].
    pub fn to_link(&self) -> IndexLink {
        IndexLink {
            alias: self.alias.clone(),
            index_name: self.index_name.clone(),
            left_field: Some(self.left_field.clone()),
            right_field: self.right_field.clone(),
        }
    }
}
