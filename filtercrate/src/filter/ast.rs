use super::value::FilterValue;
use serde::{Deserialize, Serialize};

/// IN lists longer than this are split into OR'ed IN leaves
pub const MAX_IN_LIST_SIZE: usize = 100;

/// Comparison performed by a leaf filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogicalOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
    Like,
    #[serde(rename = "ISNULL")]
    IsNull,
    #[serde(rename = "NOTNULL")]
    NotNull,
    #[serde(rename = "ISEMPTY")]
    IsEmpty,
    ContainsAll,
    Join,
    LeftJoin,
    CollectionCondition,
    Subquery,
}

impl LogicalOp {
    /// Operation matching exactly the rows this one rejects
    #[must_use]
    pub fn inverse(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Ne),
            Self::Ne => Some(Self::Eq),
            Self::Lt => Some(Self::Ge),
            Self::Ge => Some(Self::Lt),
            Self::Gt => Some(Self::Le),
            Self::Le => Some(Self::Gt),
            Self::IsNull => Some(Self::NotNull),
            Self::NotNull => Some(Self::IsNull),
            _ => None,
        }
    }

    /// Binary operator text for simple comparisons
    #[must_use]
    pub fn operator(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Ne => Some("!="),
            Self::Lt => Some("<"),
            Self::Gt => Some(">"),
            Self::Le => Some("<="),
            Self::Ge => Some(">="),
            Self::Like => Some("like"),
            _ => None,
        }
    }
}

/// Boolean connective of a composite filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

impl BooleanOp {
    #[must_use]
    pub fn conjunct(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And | Self::Not => "and",
        }
    }
}

/// Where a LIKE pattern may match inside the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchMode {
    #[default]
    Anywhere,
    Start,
    End,
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafFilter {
    pub property: String,
    pub operation: LogicalOp,
    #[serde(default)]
    pub value: FilterValue,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_condition: Option<Box<CompositeFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery_filter: Option<Box<Filter>>,
    /// Database type the column is cast to before comparing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<String>,
}

impl LeafFilter {
    pub fn new(operation: LogicalOp, property: impl Into<String>, value: FilterValue) -> Self {
        Self {
            property: property.into(),
            operation,
            value,
            match_mode: MatchMode::default(),
            ignore_case: false,
            join_property: None,
            collection_condition: None,
            subquery_class: None,
            subquery_property: None,
            subquery_filter: None,
            cast: None,
        }
    }

    /// Copy of this leaf with another operation and value, keeping the comparison flags
    #[must_use]
    pub fn with_operation(&self, operation: LogicalOp, value: FilterValue) -> Self {
        let mut leaf = Self::new(operation, self.property.clone(), value);
        leaf.match_mode = self.match_mode;
        leaf.ignore_case = self.ignore_case;
        leaf.cast.clone_from(&self.cast);
        leaf
    }

    #[must_use]
    pub fn is_collection_condition(&self) -> bool {
        self.operation == LogicalOp::CollectionCondition
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeFilter {
    pub operation: BooleanOp,
    pub children: Vec<Filter>,
}

impl CompositeFilter {
    #[must_use]
    pub fn new(operation: BooleanOp, children: Vec<Filter>) -> Self {
        Self {
            operation,
            children,
        }
    }
}

/// Boolean predicate tree over a mapped class
///
/// Built by callers with the constructor functions below or deserialized from JSON:
///
/// ```rust
/// use filtercrate::{Filter, MatchMode};
///
/// let filter = Filter::and(vec![
///     Filter::like("name", "ali", MatchMode::Start).ignore_case(),
///     Filter::collection_condition(
///         "links",
///         Filter::eq("application.name", "Active Directory"),
///     ),
/// ]);
/// assert!(filter.has_collection_condition());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Filter {
    Composite(CompositeFilter),
    Leaf(LeafFilter),
}

impl Filter {
    fn leaf(operation: LogicalOp, property: impl Into<String>, value: FilterValue) -> Self {
        Self::Leaf(LeafFilter::new(operation, property, value))
    }

    pub fn eq(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(LogicalOp::Eq, property, value.into())
    }

    pub fn ne(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(LogicalOp::Ne, property, value.into())
    }

    pub fn lt(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(LogicalOp::Lt, property, value.into())
    }

    pub fn gt(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(LogicalOp::Gt, property, value.into())
    }

    pub fn le(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(LogicalOp::Le, property, value.into())
    }

    pub fn ge(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::leaf(LogicalOp::Ge, property, value.into())
    }

    pub fn like(
        property: impl Into<String>,
        value: impl Into<FilterValue>,
        match_mode: MatchMode,
    ) -> Self {
        let mut leaf = LeafFilter::new(LogicalOp::Like, property, value.into());
        leaf.match_mode = match_mode;
        Self::Leaf(leaf)
    }

    /// IN filter, split into OR'ed IN leaves of at most [`MAX_IN_LIST_SIZE`] values
    pub fn in_list<T: Into<FilterValue>>(property: impl Into<String>, values: Vec<T>) -> Self {
        let property = property.into();
        let values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();

        if values.len() <= MAX_IN_LIST_SIZE {
            return Self::leaf(LogicalOp::In, property, FilterValue::List(values));
        }

        let slices = values
            .chunks(MAX_IN_LIST_SIZE)
            .map(|chunk| Self::leaf(LogicalOp::In, property.clone(), FilterValue::List(chunk.to_vec())))
            .collect();
        Self::or(slices)
    }

    pub fn is_null(property: impl Into<String>) -> Self {
        Self::leaf(LogicalOp::IsNull, property, FilterValue::Null)
    }

    pub fn not_null(property: impl Into<String>) -> Self {
        Self::leaf(LogicalOp::NotNull, property, FilterValue::Null)
    }

    pub fn is_empty(property: impl Into<String>) -> Self {
        Self::leaf(LogicalOp::IsEmpty, property, FilterValue::Null)
    }

    pub fn contains_all<T: Into<FilterValue>>(property: impl Into<String>, values: Vec<T>) -> Self {
        Self::leaf(LogicalOp::ContainsAll, property, FilterValue::from(values))
    }

    /// Theta join of `property` against a class-qualified `join_property` such as `Link.identity`
    pub fn join(property: impl Into<String>, join_property: impl Into<String>) -> Self {
        let mut leaf = LeafFilter::new(LogicalOp::Join, property, FilterValue::Null);
        leaf.join_property = Some(join_property.into());
        Self::Leaf(leaf)
    }

    pub fn left_join(property: impl Into<String>, join_property: impl Into<String>) -> Self {
        let mut leaf = LeafFilter::new(LogicalOp::LeftJoin, property, FilterValue::Null);
        leaf.join_property = Some(join_property.into());
        Self::Leaf(leaf)
    }

    /// Condition that must hold for one element of the collection `property`
    ///
    /// A leaf condition is wrapped in an AND composite.
    pub fn collection_condition(property: impl Into<String>, condition: Filter) -> Self {
        let composite = match condition {
            Self::Composite(composite) => composite,
            leaf @ Self::Leaf(_) => CompositeFilter::new(BooleanOp::And, vec![leaf]),
        };
        let mut leaf = LeafFilter::new(LogicalOp::CollectionCondition, property, FilterValue::Null);
        leaf.collection_condition = Some(Box::new(composite));
        Self::Leaf(leaf)
    }

    /// `property in (select subquery_property from subquery_class where filter)`
    pub fn subquery(
        property: impl Into<String>,
        subquery_class: impl Into<String>,
        subquery_property: impl Into<String>,
        filter: Option<Filter>,
    ) -> Self {
        let mut leaf = LeafFilter::new(LogicalOp::Subquery, property, FilterValue::Null);
        leaf.subquery_class = Some(subquery_class.into());
        leaf.subquery_property = Some(subquery_property.into());
        leaf.subquery_filter = filter.map(Box::new);
        Self::Leaf(leaf)
    }

    #[must_use]
    pub fn and(children: Vec<Filter>) -> Self {
        Self::Composite(CompositeFilter::new(BooleanOp::And, children))
    }

    #[must_use]
    pub fn or(children: Vec<Filter>) -> Self {
        Self::Composite(CompositeFilter::new(BooleanOp::Or, children))
    }

    #[must_use]
    pub fn not(child: Filter) -> Self {
        Self::Composite(CompositeFilter::new(BooleanOp::Not, vec![child]))
    }

    /// Request case-insensitive comparison; no effect on composites
    #[must_use]
    pub fn ignore_case(mut self) -> Self {
        if let Self::Leaf(leaf) = &mut self {
            leaf.ignore_case = true;
        }
        self
    }

    /// Cast the compared column to `db_type`; no effect on composites
    #[must_use]
    pub fn cast(mut self, db_type: impl Into<String>) -> Self {
        if let Self::Leaf(leaf) = &mut self {
            leaf.cast = Some(db_type.into());
        }
        self
    }

    #[must_use]
    pub fn as_leaf(&self) -> Option<&LeafFilter> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Composite(_) => None,
        }
    }

    #[must_use]
    pub fn as_composite(&self) -> Option<&CompositeFilter> {
        match self {
            Self::Composite(composite) => Some(composite),
            Self::Leaf(_) => None,
        }
    }

    /// Whether a collection condition occurs anywhere in this tree
    #[must_use]
    pub fn has_collection_condition(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.is_collection_condition(),
            Self::Composite(composite) => composite
                .children
                .iter()
                .any(Self::has_collection_condition),
        }
    }
}
