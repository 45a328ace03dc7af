use crate::{CompareOp, EvalError, Sandbox};
use flowcore::{ExecutionData, Value, INPUT_ROOT, NODES_ROOT, SYSTEM_ROOT, VARIABLE_ROOT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// A user-authored value or condition.
///
/// Leaves are constants, references into the execution data and sandboxed
/// expressions; composites combine them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Component {
    Constant {
        value: Value,
    },
    /// Dotted path rooted at `input`, `var`, `nodes` or `sys`.
    Reference {
        path: String,
    },
    Expression {
        script: String,
    },
    /// Text with `{{path}}` placeholders.
    Template {
        template: String,
    },
    Compare {
        op: CompareOp,
        left: Box<Component>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        right: Option<Box<Component>>,
    },
    All {
        operands: Vec<Component>,
    },
    Any {
        operands: Vec<Component>,
    },
    Not {
        operand: Box<Component>,
    },
    Object {
        fields: BTreeMap<String, Component>,
    },
    List {
        items: Vec<Component>,
    },
}

impl Component {
    pub fn constant(value: impl Into<Value>) -> Self {
        Component::Constant {
            value: value.into(),
        }
    }

    pub fn reference(path: impl Into<String>) -> Self {
        Component::Reference { path: path.into() }
    }

    pub fn expression(script: impl Into<String>) -> Self {
        Component::Expression {
            script: script.into(),
        }
    }

    pub fn template(template: impl Into<String>) -> Self {
        Component::Template {
            template: template.into(),
        }
    }

    pub fn compare(op: CompareOp, left: Component, right: Component) -> Self {
        Component::Compare {
            op,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn unary(op: CompareOp, left: Component) -> Self {
        Component::Compare {
            op,
            left: Box::new(left),
            right: None,
        }
    }

    /// Every data path the component reads, for debug snapshots.
    pub fn references(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        self.collect_references(&mut paths);
        paths
    }

    fn collect_references(&self, paths: &mut BTreeSet<String>) {
        match self {
            Component::Constant { .. } => {}
            Component::Reference { path } => {
                paths.insert(path.trim().to_string());
            }
            Component::Expression { script } => paths.extend(script_references(script)),
            Component::Template { template } => {
                paths.extend(template_placeholders(template).into_iter().map(str::to_string))
            }
            Component::Compare { left, right, .. } => {
                left.collect_references(paths);
                if let Some(right) = right {
                    right.collect_references(paths);
                }
            }
            Component::All { operands } | Component::Any { operands } => {
                operands.iter().for_each(|c| c.collect_references(paths))
            }
            Component::Not { operand } => operand.collect_references(paths),
            Component::Object { fields } => fields.values().for_each(|c| c.collect_references(paths)),
            Component::List { items } => items.iter().for_each(|c| c.collect_references(paths)),
        }
    }
}

/// Evaluates component trees against execution data.
///
/// Takes `&ExecutionData`, so evaluation can read the context but never
/// change it.
#[derive(Clone)]
pub struct ComponentEvaluator {
    sandbox: Arc<Sandbox>,
}

impl ComponentEvaluator {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Check the whole tree before anything runs: every script compiles
    /// and every binary comparison has both operands.
    pub fn prepare(&self, component: &Component) -> Result<(), EvalError> {
        match component {
            Component::Constant { .. } | Component::Template { .. } => Ok(()),
            Component::Reference { path } => {
                if path.trim().is_empty() {
                    return Err(EvalError::Invalid("reference has an empty path".to_string()));
                }
                Ok(())
            }
            Component::Expression { script } => {
                self.sandbox.check(script)?;
                Ok(())
            }
            Component::Compare { op, left, right } => {
                self.prepare(left)?;
                match right {
                    Some(right) => self.prepare(right),
                    None if op.is_unary() => Ok(()),
                    None => Err(missing_right_operand(*op)),
                }
            }
            Component::All { operands } | Component::Any { operands } => {
                operands.iter().try_for_each(|c| self.prepare(c))
            }
            Component::Not { operand } => self.prepare(operand),
            Component::Object { fields } => fields.values().try_for_each(|c| self.prepare(c)),
            Component::List { items } => items.iter().try_for_each(|c| self.prepare(c)),
        }
    }

    pub fn evaluate(&self, component: &Component, data: &ExecutionData) -> Result<Value, EvalError> {
        match component {
            Component::Constant { value } => Ok(value.clone()),
            Component::Reference { path } => Ok(data.lookup(path.trim()).unwrap_or_default()),
            Component::Expression { script } => {
                let session = self.sandbox.create_session(script)?;
                Ok(session.evaluate(&data.bindings())?)
            }
            Component::Template { template } => Ok(Value::String(render_template(template, data))),
            Component::Compare { op, left, right } => {
                let left = self.evaluate(left, data)?;
                let right = match right {
                    Some(right) => self.evaluate(right, data)?,
                    None if op.is_unary() => Value::Null,
                    None => return Err(missing_right_operand(*op)),
                };
                Ok(Value::Bool(op.apply(&left, &right)))
            }
            Component::All { operands } => {
                for operand in operands {
                    if !self.evaluate(operand, data)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Component::Any { operands } => {
                for operand in operands {
                    if self.evaluate(operand, data)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Component::Not { operand } => Ok(Value::Bool(!self.evaluate(operand, data)?.is_truthy())),
            Component::Object { fields } => {
                let mut map = HashMap::with_capacity(fields.len());
                for (name, field) in fields {
                    map.insert(name.clone(), self.evaluate(field, data)?);
                }
                Ok(Value::Object(map))
            }
            Component::List { items } => items
                .iter()
                .map(|item| self.evaluate(item, data))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }

    pub fn evaluate_condition(&self, component: &Component, data: &ExecutionData) -> Result<bool, EvalError> {
        self.evaluate(component, data).map(|value| value.is_truthy())
    }

    /// Current values of every path the component reads.
    pub fn snapshot_inputs(&self, component: &Component, data: &ExecutionData) -> HashMap<String, Value> {
        component
            .references()
            .into_iter()
            .map(|path| {
                let value = data.lookup(&path).unwrap_or_default();
                (path, value)
            })
            .collect()
    }
}

fn missing_right_operand(op: CompareOp) -> EvalError {
    EvalError::Invalid(format!("operator {:?} needs a right operand", op))
}

fn render_template(template: &str, data: &ExecutionData) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        rendered.push_str(&rest[..open]);
        let path = rest[open + 2..open + 2 + close].trim();
        if let Some(value) = data.lookup(path) {
            rendered.push_str(&value.to_display_string());
        }
        rest = &rest[open + 2 + close + 2..];
    }
    rendered.push_str(rest);
    rendered
}

fn template_placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        found.push(rest[open + 2..open + 2 + close].trim());
        rest = &rest[open + 2 + close + 2..];
    }
    found
}

/// Dotted identifier chains in a script that start at a binding root.
fn script_references(script: &str) -> Vec<String> {
    const ROOTS: [&str; 4] = [INPUT_ROOT, VARIABLE_ROOT, NODES_ROOT, SYSTEM_ROOT];

    let mut found = Vec::new();
    let mut chain: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut prev: Option<char> = None;
    let mut in_string: Option<char> = None;

    let mut flush = |chain: &mut Vec<String>, word: &mut String| {
        if !word.is_empty() {
            chain.push(std::mem::take(word));
        }
        if chain.len() > 1 && ROOTS.contains(&chain[0].as_str()) {
            found.push(chain.join("."));
        }
        chain.clear();
    };

    for c in script.chars() {
        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            prev = Some(c);
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                flush(&mut chain, &mut word);
                in_string = Some(c);
            }
            c if c.is_alphanumeric() || c == '_' => {
                let starts_word = word.is_empty();
                let after_dot = prev == Some('.');
                if starts_word && !after_dot && !chain.is_empty() {
                    flush(&mut chain, &mut word);
                }
                word.push(c);
            }
            '.' if !word.is_empty() => chain.push(std::mem::take(&mut word)),
            _ => flush(&mut chain, &mut word),
        }
        prev = Some(c);
    }
    flush(&mut chain, &mut word);

    found.sort();
    found.dedup();
    found
}
