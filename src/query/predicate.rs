//! Predicate tree
//!
//! Predicates are built from the properties and parameters of one query
//! definition and never change once built. Each node knows how to mark the
//! bounds it can supply on candidate indexes, how to emit itself into a
//! server-side filter and, for equalities, how to set key values.

use std::fmt;

use serde_json::Value;

use crate::planner::CandidateIndex;
use crate::store::{BinaryCondition, ColumnType, FilterGroup, KeyLookupOperation, ScanFilter};

use super::binding::BindingContext;
use super::domain::Field;
use super::errors::{value_type_name, QueryError, QueryResult};

/// Identity of the query definition that created a property or parameter
pub type DefinitionId = u64;

/// A field of the queried domain type
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    definition: DefinitionId,
    field: Field,
}

/// A named query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    definition: DefinitionId,
    name: String,
}

impl Parameter {
    pub(crate) fn new(definition: DefinitionId, name: impl Into<String>) -> Self {
        Self {
            definition,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Property {
    pub(crate) fn new(definition: DefinitionId, field: Field) -> Self {
        Self { definition, field }
    }

    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    fn compare(&self, op: Comparison, parameter: &Parameter) -> Predicate {
        Predicate::Compare {
            op,
            property: self.clone(),
            parameter: parameter.clone(),
        }
    }

    pub fn equal(&self, parameter: &Parameter) -> Predicate {
        self.compare(Comparison::Equal, parameter)
    }

    pub fn greater_than(&self, parameter: &Parameter) -> Predicate {
        self.compare(Comparison::GreaterThan, parameter)
    }

    pub fn greater_equal(&self, parameter: &Parameter) -> Predicate {
        self.compare(Comparison::GreaterEqual, parameter)
    }

    pub fn less_than(&self, parameter: &Parameter) -> Predicate {
        self.compare(Comparison::LessThan, parameter)
    }

    pub fn less_equal(&self, parameter: &Parameter) -> Predicate {
        self.compare(Comparison::LessEqual, parameter)
    }

    pub fn between(&self, lower: &Parameter, upper: &Parameter) -> Predicate {
        Predicate::Between {
            property: self.clone(),
            lower: lower.clone(),
            upper: upper.clone(),
        }
    }

    /// Matches any value of the array bound to `parameter`
    pub fn in_values(&self, parameter: &Parameter) -> Predicate {
        Predicate::In {
            property: self.clone(),
            parameter: parameter.clone(),
        }
    }

    pub fn like(&self, parameter: &Parameter) -> Predicate {
        Predicate::Like {
            property: self.clone(),
            parameter: parameter.clone(),
        }
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::IsNull(self.clone())
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::IsNotNull(self.clone())
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::GreaterThan => ">",
            Comparison::GreaterEqual => ">=",
            Comparison::LessThan => "<",
            Comparison::LessEqual => "<=",
        }
    }

    fn condition(&self) -> BinaryCondition {
        match self {
            Comparison::Equal => BinaryCondition::Eq,
            Comparison::GreaterThan => BinaryCondition::Gt,
            Comparison::GreaterEqual => BinaryCondition::Ge,
            Comparison::LessThan => BinaryCondition::Lt,
            Comparison::LessEqual => BinaryCondition::Le,
        }
    }
}

/// Value shape a parameter must be bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterShape {
    /// One value of the column type
    Scalar(ColumnType),
    /// Array of values of the column type (IN)
    List(ColumnType),
    /// Array with one value per column of a composite field
    Composite(Vec<ColumnType>),
}

impl ParameterShape {
    fn of(field: &Field) -> Self {
        if field.is_composite() {
            ParameterShape::Composite(field.columns().iter().map(|c| c.column_type).collect())
        } else {
            ParameterShape::Scalar(field.column_type())
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ParameterShape::Scalar(column_type) => column_type.as_str().to_string(),
            ParameterShape::List(column_type) => format!("array of {}", column_type.as_str()),
            ParameterShape::Composite(types) => format!("array of {} values", types.len()),
        }
    }

    /// Checks a value about to be bound. Null is accepted for every shape.
    pub fn check(&self, name: &str, value: &Value) -> QueryResult<()> {
        if value.is_null() {
            return Ok(());
        }
        let mismatch = |expected: &str| {
            QueryError::parameter_type_mismatch(name, expected, value_type_name(value))
        };
        match self {
            ParameterShape::Scalar(column_type) => {
                if value.is_array() || value.is_object() || !column_type.accepts(value) {
                    return Err(mismatch(column_type.as_str()));
                }
            }
            ParameterShape::List(column_type) => {
                let items = value.as_array().ok_or_else(|| {
                    QueryError::parameter_not_collection(name, value_type_name(value))
                })?;
                if let Some(bad) = items.iter().find(|v| v.is_array() || !column_type.accepts(v)) {
                    return Err(QueryError::parameter_type_mismatch(
                        name,
                        &format!("array of {}", column_type.as_str()),
                        &format!("array containing {}", value_type_name(bad)),
                    ));
                }
            }
            ParameterShape::Composite(types) => {
                let expected = format!("array of {} values", types.len());
                let items = value.as_array().ok_or_else(|| mismatch(&expected))?;
                if items.len() != types.len()
                    || items.iter().zip(types).any(|(v, t)| v.is_array() || !t.accepts(v))
                {
                    return Err(mismatch(&expected));
                }
            }
        }
        Ok(())
    }
}

/// Node of a where clause
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        op: Comparison,
        property: Property,
        parameter: Parameter,
    },
    Between {
        property: Property,
        lower: Parameter,
        upper: Parameter,
    },
    In {
        property: Property,
        parameter: Parameter,
    },
    Like {
        property: Property,
        parameter: Parameter,
    },
    IsNull(Property),
    IsNotNull(Property),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Definition the predicate was built from
    pub fn definition(&self) -> DefinitionId {
        match self {
            Predicate::Compare { property, .. }
            | Predicate::Between { property, .. }
            | Predicate::In { property, .. }
            | Predicate::Like { property, .. }
            | Predicate::IsNull(property)
            | Predicate::IsNotNull(property) => property.definition,
            Predicate::And(children) | Predicate::Or(children) => {
                children.first().map(|c| c.definition()).unwrap_or_default()
            }
            Predicate::Not(child) => child.definition(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Predicate::Compare { .. } => "Comparison",
            Predicate::Between { .. } => "Between",
            Predicate::In { .. } => "In",
            Predicate::Like { .. } => "Like",
            Predicate::IsNull(_) => "IsNull",
            Predicate::IsNotNull(_) => "IsNotNull",
            Predicate::And(_) => "And",
            Predicate::Or(_) => "Or",
            Predicate::Not(_) => "Not",
        }
    }

    /// Conjunction. An And node absorbs the operand, flattening an And operand;
    /// any other node becomes the first child of a new And.
    pub fn and(self, other: Predicate) -> QueryResult<Predicate> {
        if self.definition() != other.definition() {
            return Err(QueryError::mixed_definitions());
        }
        match self {
            Predicate::And(mut children) => {
                append(&mut children, other, Predicate::is_and);
                Ok(Predicate::And(children))
            }
            leaf => {
                let mut children = vec![leaf];
                append(&mut children, other, Predicate::is_and);
                Ok(Predicate::And(children))
            }
        }
    }

    /// Disjunction. An Or node absorbs the operand, flattening an Or operand.
    pub fn or(self, other: Predicate) -> QueryResult<Predicate> {
        if self.definition() != other.definition() {
            return Err(QueryError::mixed_definitions());
        }
        match self {
            Predicate::And(_) => Err(QueryError::not_implemented("or", "And")),
            Predicate::Or(mut children) => {
                append(&mut children, other, Predicate::is_or);
                Ok(Predicate::Or(children))
            }
            leaf => {
                let mut children = vec![leaf];
                append(&mut children, other, Predicate::is_or);
                Ok(Predicate::Or(children))
            }
        }
    }

    /// Negation of a leaf or a Not node
    pub fn not(self) -> QueryResult<Predicate> {
        match self {
            Predicate::And(_) | Predicate::Or(_) => {
                Err(QueryError::not_implemented("not", self.kind()))
            }
            other => Ok(Predicate::Not(Box::new(other))),
        }
    }

    fn is_and(&self) -> bool {
        matches!(self, Predicate::And(_))
    }

    fn is_or(&self) -> bool {
        matches!(self, Predicate::Or(_))
    }

    /// Terms that may mark index bounds: the children of a root And,
    /// otherwise the root itself.
    pub fn top_level_terms(&self) -> Vec<Predicate> {
        match self {
            Predicate::And(children) => children.clone(),
            other => vec![other.clone()],
        }
    }

    /// Checks that every property and parameter belongs to `definition` and
    /// that composite properties are only compared for equality.
    pub(crate) fn validate(&self, definition: DefinitionId) -> QueryResult<()> {
        let mut result = Ok(());
        self.visit_leaves(&mut |leaf| {
            if result.is_err() {
                return;
            }
            result = leaf.validate_leaf(definition);
        });
        result
    }

    fn validate_leaf(&self, definition: DefinitionId) -> QueryResult<()> {
        let (property, parameters): (&Property, Vec<&Parameter>) = match self {
            Predicate::Compare {
                property,
                parameter,
                ..
            }
            | Predicate::In {
                property,
                parameter,
            }
            | Predicate::Like {
                property,
                parameter,
            } => (property, vec![parameter]),
            Predicate::Between {
                property,
                lower,
                upper,
            } => (property, vec![lower, upper]),
            Predicate::IsNull(property) | Predicate::IsNotNull(property) => (property, Vec::new()),
            _ => return Ok(()),
        };
        if property.definition != definition || parameters.iter().any(|p| p.definition != definition)
        {
            return Err(QueryError::mixed_definitions());
        }
        if property.field.is_composite() {
            let equality = matches!(
                self,
                Predicate::Compare {
                    op: Comparison::Equal,
                    ..
                }
            );
            if !equality {
                return Err(QueryError::complex_property_operator(
                    property.name(),
                    &self.operator(),
                ));
            }
        }
        Ok(())
    }

    fn operator(&self) -> String {
        match self {
            Predicate::Compare { op, .. } => op.as_str().to_string(),
            other => other.kind().to_uppercase(),
        }
    }

    fn visit_leaves<'a>(&'a self, f: &mut impl FnMut(&'a Predicate)) {
        match self {
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.visit_leaves(f);
                }
            }
            Predicate::Not(child) => child.visit_leaves(f),
            leaf => f(leaf),
        }
    }

    /// Every parameter referenced, with the value shape it must be bound to
    pub(crate) fn parameters(&self) -> Vec<(&Parameter, ParameterShape)> {
        let mut found = Vec::new();
        self.visit_leaves(&mut |leaf| match leaf {
            Predicate::Compare {
                property,
                parameter,
                ..
            } => found.push((parameter, ParameterShape::of(&property.field))),
            Predicate::Between {
                property,
                lower,
                upper,
            } => {
                found.push((lower, ParameterShape::of(&property.field)));
                found.push((upper, ParameterShape::of(&property.field)));
            }
            Predicate::In {
                property,
                parameter,
            } => found.push((parameter, ParameterShape::List(property.field.column_type()))),
            Predicate::Like { parameter, .. } => {
                found.push((parameter, ParameterShape::Scalar(ColumnType::String)))
            }
            _ => {}
        });
        found
    }

    /// Contributes this term's bounds to every candidate index that has a
    /// column for the property.
    pub(crate) fn mark_bounds_for_candidate_indices(
        &self,
        term: usize,
        candidates: &mut [CandidateIndex],
    ) {
        match self {
            Predicate::Compare {
                op,
                property,
                parameter,
            } => {
                for candidate in candidates.iter_mut() {
                    let (field, param) = (property.name(), parameter.name());
                    match op {
                        Comparison::Equal => candidate.mark_equal(field, term, param),
                        Comparison::GreaterThan => candidate.mark_lower(field, term, param, true),
                        Comparison::GreaterEqual => candidate.mark_lower(field, term, param, false),
                        Comparison::LessThan => candidate.mark_upper(field, term, param, true),
                        Comparison::LessEqual => candidate.mark_upper(field, term, param, false),
                    }
                }
            }
            Predicate::Between {
                property,
                lower,
                upper,
            } => {
                for candidate in candidates.iter_mut() {
                    candidate.mark_lower(property.name(), term, lower.name(), false);
                    candidate.mark_upper(property.name(), term, upper.name(), false);
                }
            }
            Predicate::In {
                property,
                parameter,
            } => {
                for candidate in candidates.iter_mut() {
                    candidate.mark_in(property.name(), term, parameter.name());
                }
            }
            Predicate::And(children) => {
                for child in children {
                    child.mark_bounds_for_candidate_indices(term, candidates);
                }
            }
            Predicate::Like { .. }
            | Predicate::IsNull(_)
            | Predicate::IsNotNull(_)
            | Predicate::Or(_)
            | Predicate::Not(_) => {}
        }
    }

    /// True if the term can bound an index scan with the bound values
    pub fn is_usable(&self, context: &BindingContext) -> bool {
        match self {
            Predicate::Compare {
                property,
                parameter,
                ..
            } => value_is_usable(property.field(), context.get(parameter.name())),
            Predicate::Between {
                property,
                lower,
                upper,
            } => {
                value_is_usable(property.field(), context.get(lower.name()))
                    && value_is_usable(property.field(), context.get(upper.name()))
            }
            Predicate::In { parameter, .. } => list_is_usable(context.get(parameter.name())),
            Predicate::Like { parameter, .. } => context.non_null(parameter.name()).is_some(),
            Predicate::IsNull(_) | Predicate::IsNotNull(_) => true,
            Predicate::And(children) => children.iter().all(|c| c.is_usable(context)),
            Predicate::Or(_) | Predicate::Not(_) => false,
        }
    }

    /// Emits this term into a server-side filter
    pub fn filter_cmp_value(
        &self,
        context: &BindingContext,
        filter: &mut dyn ScanFilter,
    ) -> QueryResult<()> {
        let wrap = |e| QueryError::engine(format!("Error building filter for '{}'", self), e);
        match self {
            Predicate::Compare {
                op,
                property,
                parameter,
            } => {
                let value = context.value(parameter.name())?;
                let columns = property.field().columns();
                if property.field().is_composite() {
                    filter.begin(FilterGroup::And).map_err(wrap)?;
                    for (i, column) in columns.iter().enumerate() {
                        let component = value.get(i).unwrap_or(&Value::Null);
                        emit_compare(filter, *op, &column.name, component).map_err(wrap)?;
                    }
                    filter.end().map_err(wrap)?;
                } else {
                    emit_compare(filter, *op, &columns[0].name, value).map_err(wrap)?;
                }
            }
            Predicate::Between {
                property,
                lower,
                upper,
            } => {
                let column = &property.field().columns()[0].name;
                let low = context.value(lower.name())?;
                let high = context.value(upper.name())?;
                filter.begin(FilterGroup::And).map_err(wrap)?;
                filter.cmp(BinaryCondition::Ge, column, low).map_err(wrap)?;
                filter.cmp(BinaryCondition::Le, column, high).map_err(wrap)?;
                filter.end().map_err(wrap)?;
            }
            Predicate::In {
                property,
                parameter,
            } => {
                let column = &property.field().columns()[0].name;
                let value = context.value(parameter.name())?;
                let items: &[Value] = match value {
                    Value::Array(items) => items,
                    Value::Null => &[],
                    other => {
                        return Err(QueryError::parameter_not_collection(
                            parameter.name(),
                            value_type_name(other),
                        ))
                    }
                };
                filter.begin(FilterGroup::Or).map_err(wrap)?;
                for item in items {
                    filter.cmp(BinaryCondition::Eq, column, item).map_err(wrap)?;
                }
                filter.end().map_err(wrap)?;
            }
            Predicate::Like {
                property,
                parameter,
            } => {
                let value = context.value(parameter.name())?;
                let column = &property.field().columns()[0].name;
                filter.cmp(BinaryCondition::Like, column, value).map_err(wrap)?;
            }
            Predicate::IsNull(property) => {
                for column in property.field().columns() {
                    filter.is_null(&column.name).map_err(wrap)?;
                }
            }
            Predicate::IsNotNull(property) => {
                for column in property.field().columns() {
                    filter.is_not_null(&column.name).map_err(wrap)?;
                }
            }
            Predicate::And(children) | Predicate::Or(children) => {
                let group = if self.is_and() {
                    FilterGroup::And
                } else {
                    FilterGroup::Or
                };
                filter.begin(group).map_err(wrap)?;
                for child in children {
                    child.filter_cmp_value(context, filter)?;
                }
                filter.end().map_err(wrap)?;
            }
            Predicate::Not(child) => {
                filter.begin(FilterGroup::Nand).map_err(wrap)?;
                child.filter_cmp_value(context, filter)?;
                filter.end().map_err(wrap)?;
            }
        }
        Ok(())
    }

    /// Sets the key values of a point lookup. Only equalities (and
    /// conjunctions of them) can.
    pub fn operation_equal(
        &self,
        context: &BindingContext,
        op: &mut dyn KeyLookupOperation,
    ) -> QueryResult<()> {
        match self {
            Predicate::Compare {
                op: Comparison::Equal,
                property,
                parameter,
            } => {
                let value = context.value(parameter.name())?;
                let wrap = |e| QueryError::engine(format!("Error setting key for '{}'", self), e);
                if property.field().is_composite() {
                    for (i, column) in property.field().columns().iter().enumerate() {
                        let component = value.get(i).unwrap_or(&Value::Null);
                        op.equal(&column.name, component).map_err(wrap)?;
                    }
                } else {
                    op.equal(&property.field().columns()[0].name, value)
                        .map_err(wrap)?;
                }
                Ok(())
            }
            Predicate::And(children) => {
                for child in children {
                    child.operation_equal(context, op)?;
                }
                Ok(())
            }
            other => Err(QueryError::non_equality_key_term(&other.to_string())),
        }
    }
}

fn append(children: &mut Vec<Predicate>, other: Predicate, same_kind: fn(&Predicate) -> bool) {
    if same_kind(&other) {
        if let Predicate::And(more) | Predicate::Or(more) = other {
            children.extend(more);
        }
    } else {
        children.push(other);
    }
}

fn emit_compare(
    filter: &mut dyn ScanFilter,
    op: Comparison,
    column: &str,
    value: &Value,
) -> crate::store::StoreResult<()> {
    if op == Comparison::Equal && value.is_null() {
        filter.is_null(column)
    } else {
        filter.cmp(op.condition(), column, value)
    }
}

/// A bound value that can set an index bound on `field`
pub(crate) fn value_is_usable(field: &Field, value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) if field.is_composite() => {
            items.len() == field.columns().len() && items.iter().all(|v| !v.is_null())
        }
        Some(_) if field.is_composite() => false,
        Some(_) => true,
    }
}

/// An IN list that can drive a multi-range scan
pub(crate) fn list_is_usable(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => !items.is_empty() && items.iter().all(|v| !v.is_null()),
        _ => false,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare {
                op,
                property,
                parameter,
            } => write!(f, "{} {} :{}", property.name(), op.as_str(), parameter.name()),
            Predicate::Between {
                property,
                lower,
                upper,
            } => write!(
                f,
                "{} BETWEEN :{} AND :{}",
                property.name(),
                lower.name(),
                upper.name()
            ),
            Predicate::In {
                property,
                parameter,
            } => write!(f, "{} IN :{}", property.name(), parameter.name()),
            Predicate::Like {
                property,
                parameter,
            } => write!(f, "{} LIKE :{}", property.name(), parameter.name()),
            Predicate::IsNull(property) => write!(f, "{} IS NULL", property.name()),
            Predicate::IsNotNull(property) => write!(f, "{} IS NOT NULL", property.name()),
            Predicate::And(children) | Predicate::Or(children) => {
                let joiner = if self.is_and() { " AND " } else { " OR " };
                let parts: Vec<String> = children.iter().map(|c| c.to_string()).collect();
                write!(f, "({})", parts.join(joiner))
            }
            Predicate::Not(child) => write!(f, "NOT {}", child),
        }
    }
}
