//! Interpreted filters for the in-memory engine
//!
//! `MemoryFilter` records the begin/end/compare protocol into an
//! [`InterpretedCode`] program; `FilterNode` compiles that program into a tree
//! evaluated per row. No type coercion: comparisons with null or across types
//! never match.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use super::errors::{StoreError, StoreResult};
use super::key::compare_values;
use super::meta::TableMeta;
use super::operation::{
    BinaryCondition, FilterGroup, FilterInstruction, InterpretedCode, Row, ScanFilter,
};

/// Filter handle issued by [`MemoryStore`](super::MemoryStore)
pub struct MemoryFilter {
    table: Arc<TableMeta>,
    instructions: Vec<FilterInstruction>,
    depth: usize,
    released: bool,
    released_counter: Arc<AtomicU64>,
}

impl MemoryFilter {
    pub(crate) fn new(table: Arc<TableMeta>, released_counter: Arc<AtomicU64>) -> Self {
        Self {
            table,
            instructions: Vec::new(),
            depth: 0,
            released: false,
            released_counter,
        }
    }

    fn push(&mut self, instruction: FilterInstruction) -> StoreResult<()> {
        if self.released {
            return Err(StoreError::FilterReleased);
        }
        self.instructions.push(instruction);
        Ok(())
    }

    fn check_condition(&self, column: &str) -> StoreResult<()> {
        self.table.require_column(column)?;
        if self.depth == 0 {
            return Err(StoreError::Filter(format!(
                "condition on '{}' outside of a group",
                column
            )));
        }
        Ok(())
    }
}

impl ScanFilter for MemoryFilter {
    fn begin(&mut self, group: FilterGroup) -> StoreResult<()> {
        self.push(FilterInstruction::Begin(group))?;
        self.depth += 1;
        Ok(())
    }

    fn end(&mut self) -> StoreResult<()> {
        if self.depth == 0 {
            return Err(StoreError::Filter("end() without begin()".into()));
        }
        self.push(FilterInstruction::End)?;
        self.depth -= 1;
        Ok(())
    }

    fn cmp(
        &mut self,
        condition: BinaryCondition,
        column: &str,
        value: &Value,
    ) -> StoreResult<()> {
        self.check_condition(column)?;
        self.push(FilterInstruction::Compare {
            condition,
            column: column.to_string(),
            value: value.clone(),
        })
    }

    fn is_null(&mut self, column: &str) -> StoreResult<()> {
        self.check_condition(column)?;
        self.push(FilterInstruction::IsNull(column.to_string()))
    }

    fn is_not_null(&mut self, column: &str) -> StoreResult<()> {
        self.check_condition(column)?;
        self.push(FilterInstruction::IsNotNull(column.to_string()))
    }

    fn code(&self) -> StoreResult<InterpretedCode> {
        if self.released {
            return Err(StoreError::FilterReleased);
        }
        if self.depth != 0 {
            return Err(StoreError::Filter(format!("{} unclosed group(s)", self.depth)));
        }
        Ok(InterpretedCode::new(self.instructions.clone()))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.released_counter.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }
}

/// Compiled filter tree
#[derive(Debug, Clone)]
pub enum FilterNode {
    Group {
        group: FilterGroup,
        children: Vec<FilterNode>,
    },
    Compare {
        condition: BinaryCondition,
        column: String,
        value: Value,
    },
    Like {
        column: String,
        pattern: Regex,
    },
    IsNull(String),
    IsNotNull(String),
}

impl FilterNode {
    /// Compiles a program. An empty program yields None (no filtering).
    pub fn compile(code: &InterpretedCode) -> StoreResult<Option<FilterNode>> {
        let mut stack: Vec<(FilterGroup, Vec<FilterNode>)> = Vec::new();
        let mut roots: Vec<FilterNode> = Vec::new();

        for instruction in code.instructions() {
            let node = match instruction {
                FilterInstruction::Begin(group) => {
                    stack.push((*group, Vec::new()));
                    continue;
                }
                FilterInstruction::End => {
                    let (group, children) = stack
                        .pop()
                        .ok_or_else(|| StoreError::Filter("end() without begin()".into()))?;
                    FilterNode::Group { group, children }
                }
                FilterInstruction::Compare {
                    condition: BinaryCondition::Like,
                    column,
                    value,
                } => FilterNode::Like {
                    column: column.clone(),
                    pattern: like_to_regex(value)?,
                },
                FilterInstruction::Compare {
                    condition,
                    column,
                    value,
                } => FilterNode::Compare {
                    condition: *condition,
                    column: column.clone(),
                    value: value.clone(),
                },
                FilterInstruction::IsNull(column) => FilterNode::IsNull(column.clone()),
                FilterInstruction::IsNotNull(column) => FilterNode::IsNotNull(column.clone()),
            };
            match stack.last_mut() {
                Some((_, children)) => children.push(node),
                None => roots.push(node),
            }
        }

        if !stack.is_empty() {
            return Err(StoreError::Filter("unclosed group".into()));
        }
        match roots.len() {
            0 => Ok(None),
            1 => Ok(roots.pop()),
            _ => Ok(Some(FilterNode::Group {
                group: FilterGroup::And,
                children: roots,
            })),
        }
    }

    /// Evaluates the filter against one row
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            FilterNode::Group { group, children } => match group {
                FilterGroup::And => children.iter().all(|c| c.matches(row)),
                FilterGroup::Or => children.iter().any(|c| c.matches(row)),
                FilterGroup::Nand => !children.iter().all(|c| c.matches(row)),
            },
            FilterNode::Compare {
                condition,
                column,
                value,
            } => {
                let actual = row.get(column).unwrap_or(&Value::Null);
                match compare_values(actual, value) {
                    Some(ordering) => condition_holds(*condition, ordering),
                    None => false,
                }
            }
            FilterNode::Like { column, pattern } => match row.get(column) {
                Some(Value::String(s)) => pattern.is_match(s),
                _ => false,
            },
            FilterNode::IsNull(column) => row.get(column).map_or(true, Value::is_null),
            FilterNode::IsNotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
        }
    }
}

fn condition_holds(condition: BinaryCondition, ordering: Ordering) -> bool {
    match condition {
        BinaryCondition::Eq => ordering == Ordering::Equal,
        BinaryCondition::Ne => ordering != Ordering::Equal,
        BinaryCondition::Lt => ordering == Ordering::Less,
        BinaryCondition::Le => ordering != Ordering::Greater,
        BinaryCondition::Gt => ordering == Ordering::Greater,
        BinaryCondition::Ge => ordering != Ordering::Less,
        BinaryCondition::Like => false,
    }
}

/// Translates a SQL LIKE pattern (`%`, `_`, `\` escape) into an anchored regex.
fn like_to_regex(pattern: &Value) -> StoreResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::Filter("LIKE pattern must be a string".into()))?;

    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push_str("(?s)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    translated.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            c => translated.push_str(&regex::escape(&c.to_string())),
        }
    }
    translated.push('$');

    Regex::new(&translated).map_err(|e| StoreError::Filter(format!("bad LIKE pattern: {}", e)))
}
