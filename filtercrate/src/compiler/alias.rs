//! Property path to alias resolution.
//!
//! Every dotted path a filter mentions (`links.application.name`) has to be
//! turned into a reference on some alias (`identity_links_applicationAlias0.name`),
//! creating joins on the way. The context keeps a stack of scopes: the root
//! scope for the query class, plus one scope per collection condition being
//! compiled, so paths inside a collection condition resolve against the
//! collection's element.

use crate::errors::CompileError;
use crate::metadata::{MetadataRegistry, PropertyKind};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    LeftOuter,
}

impl JoinType {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "inner join",
            Self::LeftOuter => "left outer join",
        }
    }
}

/// A join added to the query
///
/// Joins are fully configured when created and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    root_alias: String,
    owner_class: String,
    target_class: Option<String>,
    property: String,
    join_type: JoinType,
    alias: String,
    join_path: String,
    on_condition: Option<String>,
}

impl Join {
    /// Alias of the FROM entry this join hangs off
    #[must_use]
    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    #[must_use]
    pub fn owner_class(&self) -> &str {
        &self.owner_class
    }

    #[must_use]
    pub fn target_class(&self) -> Option<&str> {
        self.target_class.as_deref()
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[must_use]
    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// `ownerAlias.property` for navigated joins, the class name for `on` joins
    #[must_use]
    pub fn join_path(&self) -> &str {
        &self.join_path
    }

    #[must_use]
    pub fn on_condition(&self) -> Option<&str> {
        self.on_condition.as_deref()
    }

    /// `inner join identityAlias.links identity_linksAlias0`
    #[must_use]
    pub fn render(&self) -> String {
        match &self.on_condition {
            Some(condition) => format!(
                "{} {} {} on {}",
                self.join_type.keyword(),
                self.join_path,
                self.alias,
                condition
            ),
            None => format!("{} {} {}", self.join_type.keyword(), self.join_path, self.alias),
        }
    }
}

/// A class listed in the FROM clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromEntry {
    pub class: String,
    pub alias: String,
    /// Listed after every ordinary entry and correlated in the where clause
    pub theta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Root,
    Collection,
    Theta,
}

#[derive(Debug, Clone)]
struct AliasScope {
    kind: ScopeKind,
    /// Class unqualified paths resolve against
    class: String,
    /// None inside a theta scope, where only class-qualified paths resolve
    default_alias: Option<String>,
    /// Class and path the scope's joins are named after
    root_class: String,
    path_prefix: String,
    /// `ownerAlias.property` -> join alias
    path_aliases: HashMap<String, String>,
}

/// What a path points at, found without creating joins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathShape {
    pub terminal: Option<PropertyKind>,
    /// Any segment, including the last, is a collection
    pub crosses_collection: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Resolve {
    force_unique: bool,
    force_outer: bool,
    /// Leave a trailing collection unjoined (`size(x)`, `in elements(x)`)
    collection_reference: bool,
}

/// Where a walk through the path segments currently stands
struct Cursor {
    alias: String,
    class: String,
    naming_root: String,
    naming_path: String,
}

pub struct AliasContext<'r> {
    registry: &'r MetadataRegistry,
    query_class: String,
    scopes: Vec<AliasScope>,
    class_aliases: HashMap<String, String>,
    from_entries: Vec<FromEntry>,
    joins: Vec<Join>,
    inside_or: bool,
}

impl<'r> AliasContext<'r> {
    /// Context with the query class in FROM under its default alias
    pub fn new(registry: &'r MetadataRegistry, query_class: &str) -> Self {
        let mut context = Self {
            registry,
            query_class: query_class.to_string(),
            scopes: Vec::new(),
            class_aliases: HashMap::new(),
            from_entries: Vec::new(),
            joins: Vec::new(),
            inside_or: false,
        };
        let alias = context.add_from(query_class);
        context.scopes.push(AliasScope {
            kind: ScopeKind::Root,
            class: query_class.to_string(),
            default_alias: Some(alias),
            root_class: query_class.to_string(),
            path_prefix: String::new(),
            path_aliases: HashMap::new(),
        });
        context
    }

    #[must_use]
    pub fn registry(&self) -> &'r MetadataRegistry {
        self.registry
    }

    #[must_use]
    pub fn query_class(&self) -> &str {
        &self.query_class
    }

    /// Default alias of the innermost scope
    #[must_use]
    pub fn default_alias(&self) -> Option<&str> {
        self.scopes.last().and_then(|s| s.default_alias.as_deref())
    }

    /// Alias of the query class in the root scope
    #[must_use]
    pub fn root_alias(&self) -> &str {
        self.scopes
            .first()
            .and_then(|s| s.default_alias.as_deref())
            .unwrap_or_default()
    }

    /// Class unqualified paths currently resolve against
    #[must_use]
    pub fn current_class(&self) -> &str {
        self.scopes.last().map_or(self.query_class.as_str(), |s| s.class.as_str())
    }

    #[must_use]
    pub fn in_collection_scope(&self) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.kind == ScopeKind::Collection)
    }

    #[must_use]
    pub fn in_theta_scope(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.kind == ScopeKind::Theta)
    }

    /// Mark whether joins created from now on sit under an OR; returns the previous value
    pub fn set_inside_or(&mut self, inside_or: bool) -> bool {
        std::mem::replace(&mut self.inside_or, inside_or)
    }

    #[must_use]
    pub fn is_inside_or(&self) -> bool {
        self.inside_or
    }

    // ============================================================================
    // Classes and FROM entries
    // ============================================================================

    /// Give `class` the alias `classNameAlias`, or `classNameAliasN` for a numbered instance
    pub fn set_class_alias(&mut self, class: &str, instance: Option<usize>) -> String {
        let mut alias = format!("{}Alias", lower_first(class));
        if let Some(instance) = instance {
            alias.push_str(&instance.to_string());
        }
        self.class_aliases.insert(class.to_string(), alias.clone());
        alias
    }

    #[must_use]
    pub fn class_alias(&self, class: &str) -> Option<&str> {
        self.class_aliases.get(class).map(String::as_str)
    }

    /// List `class` in FROM once, returning its alias
    pub fn add_from(&mut self, class: &str) -> String {
        if let Some(entry) = self.from_entries.iter().find(|e| !e.theta && e.class == class) {
            return entry.alias.clone();
        }
        let alias = match self.class_alias(class) {
            Some(alias) => alias.to_string(),
            None => self.set_class_alias(class, None),
        };
        self.from_entries.push(FromEntry {
            class: class.to_string(),
            alias: alias.clone(),
            theta: false,
        });
        alias
    }

    /// List a fresh numbered instance of `class` for a theta join
    pub fn add_theta_from(&mut self, class: &str, instance: usize) -> String {
        let alias = self.set_class_alias(class, Some(instance));
        self.from_entries.push(FromEntry {
            class: class.to_string(),
            alias: alias.clone(),
            theta: true,
        });
        alias
    }

    /// Add `left outer join Class alias on condition` under the query class
    pub fn add_on_join(&mut self, class: &str, property: &str, alias: &str, condition: String) {
        let root_alias = self.root_alias().to_string();
        self.joins.push(Join {
            root_alias,
            owner_class: self.query_class.clone(),
            target_class: Some(class.to_string()),
            property: property.to_string(),
            join_type: JoinType::LeftOuter,
            alias: alias.to_string(),
            join_path: class.to_string(),
            on_condition: Some(condition),
        });
    }

    #[must_use]
    pub fn from_entries(&self) -> &[FromEntry] {
        &self.from_entries
    }

    #[must_use]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    #[must_use]
    pub fn has_outer_joins(&self) -> bool {
        self.joins.iter().any(|j| j.join_type == JoinType::LeftOuter)
    }

    /// Joins hanging off `root_alias`, in creation order
    pub fn joins_for<'a>(&'a self, root_alias: &'a str) -> impl Iterator<Item = &'a Join> + 'a {
        self.joins.iter().filter(move |j| j.root_alias == root_alias)
    }

    #[must_use]
    pub fn is_from_alias(&self, alias: &str) -> bool {
        self.from_entries.iter().any(|e| e.alias == alias)
    }

    // ============================================================================
    // Scopes
    // ============================================================================

    /// Join the collection `property` and resolve paths against its element until popped
    ///
    /// Every collection condition gets its own join, even for a collection
    /// already joined elsewhere in the query.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnresolvableJoin` if `property` is not an entity collection.
    pub fn push_collection_scope(
        &mut self,
        property: &str,
        join_type: JoinType,
    ) -> Result<String, CompileError> {
        let (mut cursor, rest) = self.start(property)?.ok_or_else(|| {
            CompileError::unresolvable_join(self.current_class().to_string(), property, property)
        })?;

        let segments: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, middle)) = segments.split_last() else {
            return Err(CompileError::unresolvable_join(cursor.class, property, property));
        };

        let options = Resolve::default();
        for segment in middle {
            cursor = self.step(cursor, segment, property, options)?;
        }

        let element = match self.registry.property(&cursor.class, last).map(|p| &p.kind) {
            Some(PropertyKind::OneToMany { target, .. }) => target.clone(),
            _ => return Err(CompileError::unresolvable_join(cursor.class, *last, property)),
        };

        let naming_path = join_path(&cursor.naming_path, last);
        let alias = self.create_join(&cursor, last, Some(element.clone()), join_type);

        self.scopes.push(AliasScope {
            kind: ScopeKind::Collection,
            class: element,
            default_alias: Some(alias.clone()),
            root_class: cursor.naming_root,
            path_prefix: format!("{naming_path}."),
            path_aliases: HashMap::new(),
        });
        Ok(alias)
    }

    /// Scope with no default alias; only class-qualified paths resolve in it
    pub fn push_theta_scope(&mut self) {
        self.scopes.push(AliasScope {
            kind: ScopeKind::Theta,
            class: self.query_class.clone(),
            default_alias: None,
            root_class: self.query_class.clone(),
            path_prefix: String::new(),
            path_aliases: HashMap::new(),
        });
    }

    /// Leave the innermost scope; the root scope is never popped
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    // ============================================================================
    // Resolution
    // ============================================================================

    /// Resolve `path` to an aliased reference, creating joins as needed
    ///
    /// Returns `Ok(None)` when the path is unqualified and the current scope
    /// has no default alias.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnresolvableJoin` if a middle segment is not an association.
    pub fn substitute_alias(
        &mut self,
        path: &str,
        force_unique: bool,
        force_outer: bool,
    ) -> Result<Option<String>, CompileError> {
        self.resolve(
            path,
            Resolve {
                force_unique,
                force_outer,
                collection_reference: false,
            },
        )
    }

    /// Resolve `path` without joining a trailing collection
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnresolvableJoin` if a middle segment is not an association.
    pub fn collection_reference(&mut self, path: &str) -> Result<Option<String>, CompileError> {
        self.resolve(
            path,
            Resolve {
                collection_reference: true,
                ..Resolve::default()
            },
        )
    }

    /// Resolve `path` in the nearest enclosing scope that can resolve it
    ///
    /// Used by theta joins, whose left side names a property of the query
    /// being correlated rather than of the theta class. The scope stack is
    /// restored to its exact original order on every exit path.
    ///
    /// # Errors
    ///
    /// Returns `CompileError::UnresolvableJoin` if no enclosing scope resolves the path.
    pub fn substitute_alias_with_ancestors(&mut self, path: &str) -> Result<String, CompileError> {
        let mut stack = StackRestore::new(self);
        stack.pop_frame();

        while stack.has_frames() {
            let unique = requires_unique_join(path);
            let resolved = stack.substitute_alias(path, unique, false)?;
            stack.pop_frame();
            if let Some(resolved) = resolved {
                return Ok(resolved);
            }
        }

        Err(CompileError::unresolvable_join(
            stack.query_class.clone(),
            path,
            path,
        ))
    }

    fn resolve(&mut self, path: &str, options: Resolve) -> Result<Option<String>, CompileError> {
        let (prefix, inner, suffix) = split_function(path);
        if inner == "*" {
            return Ok(Some(path.to_string()));
        }

        let Some((mut cursor, rest)) = self.start(inner)? else {
            return Ok(None);
        };

        let segments: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, middle)) = segments.split_last() else {
            return Ok(Some(format!("{prefix}{}{suffix}", cursor.alias)));
        };

        for (position, segment) in middle.iter().enumerate() {
            let is_last_hop = position + 1 == middle.len();
            if is_last_hop && *last == "id" {
                let kind = self.registry.property(&cursor.class, segment).map(|p| &p.kind);
                if matches!(kind, Some(PropertyKind::ManyToOne { .. })) {
                    return Ok(Some(format!(
                        "{prefix}{}.{segment}.id{suffix}",
                        cursor.alias
                    )));
                }
            }
            cursor = self.step(cursor, segment, path, options)?;
        }

        let terminal = self
            .registry
            .property(&cursor.class, last)
            .map(|p| p.kind.clone());
        let reference = match terminal {
            Some(kind) if kind.is_collection() && !options.collection_reference => {
                self.join_segment(&cursor, last, kind.target().map(str::to_string), options)
            }
            _ => format!("{}.{last}", cursor.alias),
        };

        Ok(Some(format!("{prefix}{reference}{suffix}")))
    }

    /// Where resolution of `path` starts: a class root or the scope's default alias
    fn start<'p>(&self, path: &'p str) -> Result<Option<(Cursor, &'p str)>, CompileError> {
        let (first, rest) = path.split_once('.').unwrap_or((path, ""));

        if starts_upper(first) && self.registry.is_known_class(first) {
            let alias = self
                .class_alias(first)
                .map(str::to_string)
                .ok_or_else(|| CompileError::unresolvable_join(first, first, path))?;
            let cursor = Cursor {
                alias,
                class: first.to_string(),
                naming_root: first.to_string(),
                naming_path: String::new(),
            };
            return Ok(Some((cursor, rest)));
        }

        let Some(scope) = self.scopes.last() else {
            return Ok(None);
        };
        let Some(alias) = scope.default_alias.clone() else {
            return Ok(None);
        };
        let cursor = Cursor {
            alias,
            class: scope.class.clone(),
            naming_root: scope.root_class.clone(),
            naming_path: scope.path_prefix.trim_end_matches('.').to_string(),
        };
        Ok(Some((cursor, path)))
    }

    /// Navigate one association segment, joining it
    fn step(
        &mut self,
        cursor: Cursor,
        segment: &str,
        path: &str,
        options: Resolve,
    ) -> Result<Cursor, CompileError> {
        let target = match self.registry.property(&cursor.class, segment).map(|p| &p.kind) {
            Some(PropertyKind::ManyToOne { target } | PropertyKind::OneToMany { target, .. }) => {
                target.clone()
            }
            _ => return Err(CompileError::unresolvable_join(cursor.class, segment, path)),
        };

        let alias = self.join_segment(&cursor, segment, Some(target.clone()), options);
        Ok(Cursor {
            alias,
            class: target,
            naming_root: cursor.naming_root,
            naming_path: join_path(&cursor.naming_path, segment),
        })
    }

    /// Reuse the scope's join for `cursor.alias.segment`, or create one
    fn join_segment(
        &mut self,
        cursor: &Cursor,
        segment: &str,
        target: Option<String>,
        options: Resolve,
    ) -> String {
        let key = format!("{}.{segment}", cursor.alias);
        if !options.force_unique {
            if let Some(alias) = self.scopes.last().and_then(|s| s.path_aliases.get(&key)) {
                return alias.clone();
            }
        }

        let join_type = if options.force_outer || self.inside_or {
            JoinType::LeftOuter
        } else {
            JoinType::Inner
        };
        let alias = self.create_join(cursor, segment, target, join_type);

        if !options.force_unique {
            if let Some(scope) = self.scopes.last_mut() {
                scope.path_aliases.insert(key, alias.clone());
            }
        }
        alias
    }

    fn create_join(
        &mut self,
        cursor: &Cursor,
        segment: &str,
        target: Option<String>,
        join_type: JoinType,
    ) -> String {
        let base = lower_first(&format!(
            "{}_{}",
            cursor.naming_root,
            join_path(&cursor.naming_path, segment).replace('.', "_")
        ));
        let base = format!("{base}Alias");
        let instance = self
            .joins
            .iter()
            .filter(|j| j.alias.strip_prefix(&base).is_some_and(is_digits))
            .count();
        let alias = format!("{base}{instance}");

        let root_alias = self.root_of(&cursor.alias);
        self.joins.push(Join {
            root_alias,
            owner_class: cursor.class.clone(),
            target_class: target,
            property: segment.to_string(),
            join_type,
            alias: alias.clone(),
            join_path: format!("{}.{segment}", cursor.alias),
            on_condition: None,
        });
        alias
    }

    /// FROM entry (or `on` join) alias that `alias` was joined from
    fn root_of(&self, alias: &str) -> String {
        self.joins
            .iter()
            .find(|j| j.alias == alias && j.on_condition.is_none())
            .map_or_else(|| alias.to_string(), |j| j.root_alias.clone())
    }

    /// Describe `path` in the current scope without creating joins
    #[must_use]
    pub fn describe(&self, path: &str) -> PathShape {
        let (_, inner, _) = split_function(path);
        let (first, rest) = inner.split_once('.').unwrap_or((inner, ""));

        let (mut class, rest) = if starts_upper(first) && self.registry.is_known_class(first) {
            (first.to_string(), rest)
        } else {
            (self.current_class().to_string(), inner)
        };

        let mut shape = PathShape::default();
        let segments: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();
        for (position, segment) in segments.iter().enumerate() {
            let Some(property) = self.registry.property(&class, segment) else {
                return shape;
            };
            if property.kind.is_collection() {
                shape.crosses_collection = true;
            }
            if position + 1 == segments.len() {
                shape.terminal = Some(property.kind.clone());
            } else if let Some(target) = property.kind.target() {
                class = target.to_string();
            } else {
                return shape;
            }
        }
        shape
    }

    #[must_use]
    pub fn is_scalar_collection(&self, path: &str) -> bool {
        matches!(self.describe(path).terminal, Some(PropertyKind::ScalarCollection))
    }
}

/// Pops scopes for an ancestor walk and pushes them back when dropped
struct StackRestore<'a, 'r> {
    context: &'a mut AliasContext<'r>,
    popped: Vec<AliasScope>,
}

impl<'a, 'r> StackRestore<'a, 'r> {
    fn new(context: &'a mut AliasContext<'r>) -> Self {
        Self {
            context,
            popped: Vec::new(),
        }
    }

    fn pop_frame(&mut self) {
        if let Some(scope) = self.context.scopes.pop() {
            self.popped.push(scope);
        }
    }

    fn has_frames(&self) -> bool {
        !self.context.scopes.is_empty()
    }
}

impl<'r> Deref for StackRestore<'_, 'r> {
    type Target = AliasContext<'r>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for StackRestore<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for StackRestore<'_, '_> {
    fn drop(&mut self) {
        while let Some(scope) = self.popped.pop() {
            self.context.scopes.push(scope);
        }
    }
}

/// Whether resolving `path` from an ancestor scope needs its own joins
///
/// Plain properties and `Class.property` references never join.
#[must_use]
pub fn requires_unique_join(path: &str) -> bool {
    let dots = path.matches('.').count();
    match dots {
        0 => false,
        1 => !path.chars().next().is_some_and(char::is_uppercase),
        _ => true,
    }
}

/// Split `count(distinct x.y)` into `("count(distinct ", "x.y", ")")`
fn split_function(path: &str) -> (&str, &str, &str) {
    let (Some(open), true) = (path.find('('), path.ends_with(')')) else {
        return ("", path, "");
    };
    let inner = &path[open + 1..path.len() - 1];
    let trimmed = inner.trim_start();
    let skipped = inner.len() - trimmed.len();

    let keyword_len = if trimmed.starts_with("distinct ") {
        "distinct ".len()
    } else {
        0
    };
    let split = open + 1 + skipped + keyword_len;
    (&path[..split], path[split..path.len() - 1].trim(), ")")
}

fn starts_upper(segment: &str) -> bool {
    segment.chars().next().is_some_and(char::is_uppercase)
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
