// SPDX-License-Identifier: PMPL-1.0-or-later
//! Index metadata resolution.
//!
//! The rewriter never talks to the backend's mapping API directly; it sees
//! metadata through the [`IndexMetadata`] trait, which is read-only for the
//! duration of one rewrite. [`StaticMetadata`] is the bundled map-backed
//! implementation used for configuration-driven setups and tests.

use std::collections::HashMap;

use refract_ast::IndexLink;

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    Integer,
    Long,
    Float,
    Double,
    Text,
    #[default]
    Unknown,
}

/// Read-only view of index mappings.
///
/// Field names may be alias-qualified (`alias.field`); implementations
/// resolve the alias to the linked index that declared it.
pub trait IndexMetadata {
    /// Declared type of `field`, [`FieldType::Unknown`] when unmapped.
    fn field_type(&self, field: &str) -> FieldType;

    /// Search-analyzer class for `field` (`exact`, `phrase`, `fulltext`,
    /// `date`), when one is mapped.
    fn search_analyzer(&self, field: &str) -> Option<String>;

    /// Primary-key field of `index`.
    fn primary_key_field(&self, index: &str) -> Option<String>;

    /// Nested-object path containing `field`, when the field lives inside
    /// a nested mapping.
    fn nested_path(&self, field: &str) -> Option<String>;

    /// The link of the index that owns `field`.
    fn resolve_field(&self, field: &str) -> Option<IndexLink>;

    /// Every mapped field of `index`, paired with that index's link.
    fn all_fields(&self, index: &str) -> Vec<(String, IndexLink)>;
}

#[derive(Debug, Clone)]
struct FieldDef {
    field_type: FieldType,
    analyzer: Option<String>,
}

/// Mapping description for one index.
#[derive(Debug, Clone)]
pub struct IndexDef {
    name: String,
    primary_key: String,
    fields: HashMap<String, FieldDef>,
    nested_paths: Vec<String>,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        let mut def = IndexDef {
            name: name.into(),
            primary_key: String::new(),
            fields: HashMap::new(),
            nested_paths: Vec::new(),
        };
        def = def.with_field(&primary_key, FieldType::Long);
        def.primary_key = primary_key;
        def
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef {
                field_type,
                analyzer: None,
            },
        );
        self
    }

    /// Register a field with an explicit search analyzer class.
    pub fn with_analyzed_field(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        analyzer: impl Into<String>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef {
                field_type,
                analyzer: Some(analyzer.into()),
            },
        );
        self
    }

    /// Register a nested-object path. Fields under it (dotted) resolve
    /// their nested path to the longest registered prefix.
    pub fn with_nested_path(mut self, path: impl Into<String>) -> Self {
        self.nested_paths.push(path.into());
        self
    }

    fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    fn nested_path_of(&self, field: &str) -> Option<String> {
        self.nested_paths
            .iter()
            .filter(|p| {
                field.len() > p.len() && field.starts_with(p.as_str()) && field.as_bytes()[p.len()] == b'.'
            })
            .max_by_key(|p| p.len())
            .cloned()
    }
}

/// Map-backed [`IndexMetadata`]: one main index plus any number of linked
/// foreign indices, searched in registration order.
#[derive(Debug, Clone)]
pub struct StaticMetadata {
    main: IndexDef,
    foreign: Vec<(IndexLink, IndexDef)>,
}

impl StaticMetadata {
    pub fn new(main: IndexDef) -> Self {
        StaticMetadata {
            main,
            foreign: Vec::new(),
        }
    }

    /// Register a foreign index reachable through `link`.
    pub fn with_linked(mut self, link: IndexLink, def: IndexDef) -> Self {
        self.foreign.push((link, def));
        self
    }

    /// The anchor link for the main index.
    pub fn local_link(&self) -> IndexLink {
        IndexLink::local(&self.main.name, &self.main.primary_key)
    }

    /// Find the definition owning `field`, resolving alias qualification.
    fn owner_of(&self, field: &str) -> Option<(Option<&IndexLink>, &IndexDef, String)> {
        // alias-qualified names pick the linked index directly
        if let Some((alias, rest)) = field.split_once('.') {
            for (link, def) in &self.foreign {
                if link.alias.as_deref() == Some(alias) && def.field(rest).is_some() {
                    return Some((Some(link), def, rest.to_string()));
                }
            }
        }
        if self.main.field(field).is_some() {
            return Some((None, &self.main, field.to_string()));
        }
        for (link, def) in &self.foreign {
            if def.field(field).is_some() {
                return Some((Some(link), def, field.to_string()));
            }
        }
        // dotted nested fields belong to whichever index declares the path
        if self.main.nested_path_of(field).is_some() {
            return Some((None, &self.main, field.to_string()));
        }
        None
    }

    fn def_of(&self, index: &str) -> Option<&IndexDef> {
        if self.main.name == index {
            return Some(&self.main);
        }
        self.foreign
            .iter()
            .map(|(_, def)| def)
            .find(|def| def.name == index)
    }
}

impl IndexMetadata for StaticMetadata {
    fn field_type(&self, field: &str) -> FieldType {
        self.owner_of(field)
            .and_then(|(_, def, local)| def.field(&local))
            .map(|f| f.field_type)
            .unwrap_or_default()
    }

    fn search_analyzer(&self, field: &str) -> Option<String> {
        let (_, def, local) = self.owner_of(field)?;
        def.field(&local)?.analyzer.clone()
    }

    fn primary_key_field(&self, index: &str) -> Option<String> {
        self.def_of(index).map(|def| def.primary_key.clone())
    }

    fn nested_path(&self, field: &str) -> Option<String> {
        let (_, def, local) = self.owner_of(field)?;
        def.nested_path_of(&local)
    }

    fn resolve_field(&self, field: &str) -> Option<IndexLink> {
        let (link, _, _) = self.owner_of(field)?;
        Some(match link {
            Some(link) => link.clone(),
            None => self.local_link(),
        })
    }

    fn all_fields(&self, index: &str) -> Vec<(String, IndexLink)> {
        let Some(def) = self.def_of(index) else {
            return Vec::new();
        };
        let link = if def.name == self.main.name {
            self.local_link()
        } else {
            match self.foreign.iter().find(|(_, d)| d.name == index) {
                Some((link, _)) => link.clone(),
                None => return Vec::new(),
            }
        };
        let mut fields: Vec<_> = def
            .fields
            .keys()
            .map(|name| (name.clone(), link.clone()))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields
    }
}
