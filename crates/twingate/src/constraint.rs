use regex::Regex;

use serde_json::{Map, Value, json};

use crate::error::{Error, ErrorKind, Result};

const OPERATOR_KEY: &str = "operator";
const OPERAND_KEY: &str = "operand";
const COMPLEMENT_KEY: &str = "complement";

fn constraint_error(info: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::Constraint, info)
}

/// Compares two values, treating numbers by their numeric value.
///
/// `5` and `5.0` are equal, while `JSON` structures are compared
/// structurally.
#[must_use]
pub fn values_equal(first: &Value, second: &Value) -> bool {
    match (first, second) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        _ => first == second,
    }
}

fn value_length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

/// Logical operators combining the constraints of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    /// All constraints must be satisfied.
    And,
    /// At least one constraint must be satisfied.
    Or,
}

impl LogicalOperator {
    const fn name(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }
}

/// A regular expression that must match a whole string.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Pattern {
    fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{source})$"))
            .map_err(|e| constraint_error(format!("Invalid pattern `{source}`: {e}")))?;
        Ok(Self {
            source: source.into(),
            regex,
        })
    }

    /// Returns the pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// All supported constraint kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// The value must be equal to the operand.
    Fixed(Value),
    /// The value must be different from the operand.
    Different(Value),
    /// The value must be a number lesser than the operand.
    Lesser(f64),
    /// The value must be a number lesser than or equal to the operand.
    LesserEqual(f64),
    /// The value must be a number greater than the operand.
    Greater(f64),
    /// The value must be a number greater than or equal to the operand.
    GreaterEqual(f64),
    /// The length of the value must be equal to the operand.
    Length(usize),
    /// The length of the value must be at least the operand.
    MinLength(usize),
    /// The length of the value must be at most the operand.
    MaxLength(usize),
    /// The value must be a string matching the pattern.
    Pattern(Pattern),
    /// The value must be equal to one of the operands.
    Among(Vec<Value>),
    /// The value must satisfy the nested constraints combined by
    /// the logical operator.
    Expression(LogicalOperator, Vec<Constraint>),
}

impl ConstraintKind {
    /// Returns the operator identifying the constraint kind.
    #[must_use]
    pub const fn operator(&self) -> &'static str {
        match self {
            Self::Fixed(_) => "==",
            Self::Different(_) => "!=",
            Self::Lesser(_) => "<",
            Self::LesserEqual(_) => "<=",
            Self::Greater(_) => ">",
            Self::GreaterEqual(_) => ">=",
            Self::Length(_) => "length",
            Self::MinLength(_) => "minLength",
            Self::MaxLength(_) => "maxLength",
            Self::Pattern(_) => "regex",
            Self::Among(_) => "in",
            Self::Expression(operator, _) => operator.name(),
        }
    }

    fn complies(&self, value: &Value) -> bool {
        let number = || value.as_f64();
        let length = || value_length(value);
        match self {
            Self::Fixed(operand) => values_equal(value, operand),
            Self::Different(operand) => !values_equal(value, operand),
            Self::Lesser(operand) => number().is_some_and(|v| v < *operand),
            Self::LesserEqual(operand) => number().is_some_and(|v| v <= *operand),
            Self::Greater(operand) => number().is_some_and(|v| v > *operand),
            Self::GreaterEqual(operand) => number().is_some_and(|v| v >= *operand),
            Self::Length(operand) => length().is_some_and(|l| l == *operand),
            Self::MinLength(operand) => length().is_some_and(|l| l >= *operand),
            Self::MaxLength(operand) => length().is_some_and(|l| l <= *operand),
            Self::Pattern(pattern) => value.as_str().is_some_and(|s| pattern.regex.is_match(s)),
            Self::Among(operands) => operands.iter().any(|o| values_equal(value, o)),
            Self::Expression(LogicalOperator::And, constraints) => {
                constraints.iter().all(|c| c.complies(value))
            }
            Self::Expression(LogicalOperator::Or, constraints) => {
                constraints.iter().any(|c| c.complies(value))
            }
        }
    }

    fn operand(&self) -> Value {
        match self {
            Self::Fixed(operand) | Self::Different(operand) => operand.clone(),
            Self::Lesser(operand)
            | Self::LesserEqual(operand)
            | Self::Greater(operand)
            | Self::GreaterEqual(operand) => json!(operand),
            Self::Length(operand) | Self::MinLength(operand) | Self::MaxLength(operand) => {
                json!(operand)
            }
            Self::Pattern(pattern) => Value::String(pattern.source.clone()),
            Self::Among(operands) => Value::Array(operands.clone()),
            Self::Expression(_, constraints) => {
                Value::Array(constraints.iter().map(Constraint::to_json).collect())
            }
        }
    }
}

/// A constraint restricting the values accepted by a parameter.
///
/// A complemented constraint accepts exactly the values rejected by
/// its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    kind: ConstraintKind,
    complement: bool,
}

impl Constraint {
    /// Creates a [`Constraint`] from a [`ConstraintKind`].
    #[must_use]
    pub const fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            complement: false,
        }
    }

    /// Creates a [`ConstraintKind::Fixed`] constraint.
    #[must_use]
    #[inline]
    pub fn fixed(value: impl Into<Value>) -> Self {
        Self::new(ConstraintKind::Fixed(value.into()))
    }

    /// Creates a [`ConstraintKind::Different`] constraint.
    #[must_use]
    #[inline]
    pub fn different(value: impl Into<Value>) -> Self {
        Self::new(ConstraintKind::Different(value.into()))
    }

    /// Creates a [`ConstraintKind::Lesser`] constraint.
    #[must_use]
    pub const fn lesser(bound: f64) -> Self {
        Self::new(ConstraintKind::Lesser(bound))
    }

    /// Creates a [`ConstraintKind::LesserEqual`] constraint.
    #[must_use]
    pub const fn lesser_equal(bound: f64) -> Self {
        Self::new(ConstraintKind::LesserEqual(bound))
    }

    /// Creates a [`ConstraintKind::Greater`] constraint.
    #[must_use]
    pub const fn greater(bound: f64) -> Self {
        Self::new(ConstraintKind::Greater(bound))
    }

    /// Creates a [`ConstraintKind::GreaterEqual`] constraint.
    #[must_use]
    pub const fn greater_equal(bound: f64) -> Self {
        Self::new(ConstraintKind::GreaterEqual(bound))
    }

    /// Creates a [`ConstraintKind::Length`] constraint.
    #[must_use]
    pub const fn length(length: usize) -> Self {
        Self::new(ConstraintKind::Length(length))
    }

    /// Creates a [`ConstraintKind::MinLength`] constraint.
    #[must_use]
    pub const fn min_length(length: usize) -> Self {
        Self::new(ConstraintKind::MinLength(length))
    }

    /// Creates a [`ConstraintKind::MaxLength`] constraint.
    #[must_use]
    pub const fn max_length(length: usize) -> Self {
        Self::new(ConstraintKind::MaxLength(length))
    }

    /// Creates a [`ConstraintKind::Pattern`] constraint.
    ///
    /// # Errors
    ///
    /// An error is returned when the pattern is not a valid
    /// regular expression.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Pattern::new(pattern).map(|p| Self::new(ConstraintKind::Pattern(p)))
    }

    /// Creates a [`ConstraintKind::Among`] constraint.
    #[must_use]
    #[inline]
    pub fn among<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(ConstraintKind::Among(
            values.into_iter().map(Into::into).collect(),
        ))
    }

    /// Creates an expression satisfied when **all** constraints are.
    #[must_use]
    #[inline]
    pub fn and(constraints: Vec<Self>) -> Self {
        Self::new(ConstraintKind::Expression(LogicalOperator::And, constraints))
    }

    /// Creates an expression satisfied when **at least one** constraint is.
    #[must_use]
    #[inline]
    pub fn or(constraints: Vec<Self>) -> Self {
        Self::new(ConstraintKind::Expression(LogicalOperator::Or, constraints))
    }

    /// Complements the constraint.
    #[must_use]
    pub const fn complement(mut self) -> Self {
        self.complement = !self.complement;
        self
    }

    /// Returns the [`ConstraintKind`].
    #[must_use]
    pub const fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Checks whether the constraint is complemented.
    #[must_use]
    pub const fn is_complemented(&self) -> bool {
        self.complement
    }

    /// Checks whether the given value satisfies the constraint.
    #[must_use]
    pub fn complies(&self, value: &Value) -> bool {
        self.kind.complies(value) != self.complement
    }

    /// Builds a [`Constraint`] from its `JSON` description.
    ///
    /// A description is either an object with `operator`, `operand`, and
    /// optional `complement` fields, or an array of descriptions. An array
    /// is an `AND` expression unless its first element is the
    /// `"AND"` or `"OR"` string.
    ///
    /// # Errors
    ///
    /// An error is returned when the description does not define
    /// a known constraint or when the operand does not fit the operator.
    pub fn from_json(description: &Value) -> Result<Self> {
        match description {
            Value::Object(object) => Self::from_object(object),
            Value::Array(array) => Self::from_array(array),
            _ => Err(constraint_error(format!(
                "Unable to build a constraint from `{description}`"
            ))),
        }
    }

    /// Returns the `JSON` description of the [`Constraint`].
    #[must_use]
    pub fn to_json(&self) -> Value {
        if let ConstraintKind::Expression(operator, _) = &self.kind
            && !self.complement
        {
            let mut array = vec![Value::String(operator.name().into())];
            if let Value::Array(constraints) = self.kind.operand() {
                array.extend(constraints);
            }
            return Value::Array(array);
        }

        json!({
            OPERATOR_KEY: self.kind.operator(),
            OPERAND_KEY: self.kind.operand(),
            COMPLEMENT_KEY: self.complement,
        })
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self> {
        let operator = object
            .get(OPERATOR_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| constraint_error("Null operator"))?;

        let complement = match object.get(COMPLEMENT_KEY) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(complement)) => *complement,
            Some(value) => {
                return Err(constraint_error(format!(
                    "Invalid complement value `{value}`"
                )));
            }
        };

        let raw_operand = object.get(OPERAND_KEY).cloned().unwrap_or(Value::Null);

        let kind = if let Some(logical_operator) = LogicalOperator::from_name(operator) {
            let Value::Array(descriptions) = raw_operand else {
                return Err(constraint_error(format!(
                    "The `{operator}` operator requires an array of constraints"
                )));
            };
            ConstraintKind::Expression(
                logical_operator,
                descriptions
                    .iter()
                    .map(Self::from_json)
                    .collect::<Result<_>>()?,
            )
        } else {
            Self::kind_from_operand(operator, raw_operand)?
        };

        Ok(Self { kind, complement })
    }

    fn from_array(array: &[Value]) -> Result<Self> {
        let (operator, descriptions) =
            match array.first().and_then(Value::as_str).and_then(LogicalOperator::from_name) {
                Some(operator) => (operator, &array[1..]),
                None => {
                    if let [Value::Object(object)] = array {
                        return Self::from_object(object);
                    }
                    (LogicalOperator::And, array)
                }
            };

        let constraints = descriptions
            .iter()
            .map(Self::from_json)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(ConstraintKind::Expression(operator, constraints)))
    }

    fn kind_from_operand(operator: &str, operand: Value) -> Result<ConstraintKind> {
        let number = |operand: &Value| {
            operand.as_f64().ok_or_else(|| {
                constraint_error(format!(
                    "The `{operator}` operator requires a numeric operand"
                ))
            })
        };
        let length = |operand: &Value| {
            operand
                .as_u64()
                .and_then(|l| usize::try_from(l).ok())
                .ok_or_else(|| {
                    constraint_error(format!(
                        "The `{operator}` operator requires a positive integer operand"
                    ))
                })
        };

        Ok(match operator {
            // Value operands are kept as they are, arrays included.
            "==" => ConstraintKind::Fixed(operand),
            "!=" => ConstraintKind::Different(operand),
            "in" => match operand {
                Value::Array(operands) => ConstraintKind::Among(operands),
                Value::Null => ConstraintKind::Among(Vec::new()),
                operand => ConstraintKind::Among(vec![operand]),
            },
            "<" => ConstraintKind::Lesser(number(&scalar_operand(operand))?),
            "<=" => ConstraintKind::LesserEqual(number(&scalar_operand(operand))?),
            ">" => ConstraintKind::Greater(number(&scalar_operand(operand))?),
            ">=" => ConstraintKind::GreaterEqual(number(&scalar_operand(operand))?),
            "length" => ConstraintKind::Length(length(&scalar_operand(operand))?),
            "minLength" => ConstraintKind::MinLength(length(&scalar_operand(operand))?),
            "maxLength" => ConstraintKind::MaxLength(length(&scalar_operand(operand))?),
            "regex" => {
                let operand = scalar_operand(operand);
                let source = operand.as_str().ok_or_else(|| {
                    constraint_error("The `regex` operator requires a string operand")
                })?;
                ConstraintKind::Pattern(Pattern::new(source)?)
            }
            _ => {
                return Err(constraint_error(format!("Unknown operator `{operator}`")));
            }
        })
    }
}

// Scalar operators accept their operand wrapped in a single-element array.
fn scalar_operand(operand: Value) -> Value {
    match operand {
        Value::Array(mut operands) if operands.len() == 1 => operands.remove(0),
        operand => operand,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::ErrorKind;

    use super::{Constraint, ConstraintKind, LogicalOperator, values_equal};

    #[test]
    fn fixed_constraint() {
        let constraint = Constraint::fixed(42);

        assert!(constraint.complies(&json!(42)));
        assert!(constraint.complies(&json!(42.0)));
        assert!(!constraint.complies(&json!(43)));
        assert!(!constraint.complies(&json!("42")));

        let constraint = Constraint::fixed("on");
        assert!(constraint.complies(&json!("on")));
        assert!(!constraint.complies(&json!("off")));
    }

    #[test]
    fn complemented_constraint() {
        let constraint = Constraint::fixed("on").complement();

        assert!(constraint.is_complemented());
        assert!(!constraint.complies(&json!("on")));
        assert!(constraint.complies(&json!("off")));
    }

    #[test]
    fn numeric_constraints() {
        assert!(Constraint::lesser(10.).complies(&json!(9.5)));
        assert!(!Constraint::lesser(10.).complies(&json!(10)));
        assert!(Constraint::lesser_equal(10.).complies(&json!(10)));
        assert!(Constraint::greater(0.).complies(&json!(1)));
        assert!(!Constraint::greater(0.).complies(&json!("1")));
        assert!(Constraint::greater_equal(0.).complies(&json!(0)));
    }

    #[test]
    fn length_constraints() {
        assert!(Constraint::length(3).complies(&json!("abc")));
        assert!(Constraint::min_length(2).complies(&json!([1, 2, 3])));
        assert!(!Constraint::max_length(2).complies(&json!([1, 2, 3])));
        assert!(!Constraint::length(1).complies(&json!(1)));
    }

    #[test]
    fn pattern_constraint() {
        let constraint = Constraint::pattern("[a-z]+[0-9]").unwrap();

        assert!(constraint.complies(&json!("dev1")));
        // The whole string must match.
        assert!(!constraint.complies(&json!("dev1/temperature")));
        assert!(!constraint.complies(&json!(1)));

        assert_eq!(
            Constraint::pattern("(").unwrap_err().kind(),
            ErrorKind::Constraint
        );
    }

    #[test]
    fn expressions() {
        let range = Constraint::and(vec![Constraint::greater_equal(0.), Constraint::lesser(100.)]);
        assert!(range.complies(&json!(50)));
        assert!(!range.complies(&json!(100)));

        let choice = Constraint::or(vec![Constraint::fixed("on"), Constraint::fixed("off")]);
        assert!(choice.complies(&json!("off")));
        assert!(!choice.complies(&json!("dim")));

        assert!(Constraint::among(["on", "off"]).complies(&json!("on")));
    }

    #[test]
    fn constraint_from_json() {
        let constraint =
            Constraint::from_json(&json!({"operator": "<", "operand": 5, "complement": true}))
                .unwrap();
        assert_eq!(constraint, Constraint::lesser(5.).complement());

        // Scalar operators unwrap a single-element operand array.
        let constraint = Constraint::from_json(&json!({"operator": "<=", "operand": [3]})).unwrap();
        assert_eq!(constraint, Constraint::lesser_equal(3.));

        let constraint = Constraint::from_json(&json!([
            "OR",
            {"operator": "==", "operand": "on"},
            {"operator": "==", "operand": "off"}
        ]))
        .unwrap();
        assert_eq!(
            constraint.kind(),
            &ConstraintKind::Expression(
                LogicalOperator::Or,
                vec![Constraint::fixed("on"), Constraint::fixed("off")]
            )
        );

        // A single constraint inside an array is the constraint itself.
        let constraint =
            Constraint::from_json(&json!([{"operator": "minLength", "operand": 2}])).unwrap();
        assert_eq!(constraint, Constraint::min_length(2));

        assert_eq!(
            Constraint::from_json(&json!({"operand": 2})).unwrap_err().kind(),
            ErrorKind::Constraint
        );
        assert_eq!(
            Constraint::from_json(&json!({"operator": "~", "operand": 2}))
                .unwrap_err()
                .kind(),
            ErrorKind::Constraint
        );
        assert_eq!(
            Constraint::from_json(&json!({"operator": "<", "operand": "a"}))
                .unwrap_err()
                .kind(),
            ErrorKind::Constraint
        );
    }

    #[test]
    fn array_operands_survive_json() {
        for constraint in [
            Constraint::fixed(json!(["eco"])),
            Constraint::fixed(json!([])),
            Constraint::fixed(json!(["eco", "boost"])),
            Constraint::fixed(json!([["eco"]])).complement(),
        ] {
            assert_eq!(Constraint::from_json(&constraint.to_json()).unwrap(), constraint);
        }

        let constraint =
            Constraint::from_json(&json!({"operator": "==", "operand": ["eco"]})).unwrap();
        assert!(constraint.complies(&json!(["eco"])));
        assert!(!constraint.complies(&json!("eco")));
    }

    #[test]
    fn constraint_to_json() {
        assert_eq!(
            Constraint::fixed("on").to_json(),
            json!({"operator": "==", "operand": "on", "complement": false})
        );

        let expression = Constraint::and(vec![Constraint::min_length(1), Constraint::max_length(8)]);
        let description = expression.to_json();
        assert_eq!(
            description,
            json!([
                "AND",
                {"operator": "minLength", "operand": 1, "complement": false},
                {"operator": "maxLength", "operand": 8, "complement": false}
            ])
        );
        assert_eq!(Constraint::from_json(&description).unwrap(), expression);

        let complemented = expression.complement();
        assert_eq!(
            Constraint::from_json(&complemented.to_json()).unwrap(),
            complemented
        );
    }

    #[test]
    fn numeric_equality() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(1), &json!(true)));
    }
}
