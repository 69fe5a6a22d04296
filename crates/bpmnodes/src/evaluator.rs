use bpmcore::{Bindings, EvaluationError, ExpressionEvaluator, Value};
use std::cmp::Ordering;

/// Small built-in expression language
///
/// Guards: comparisons (`== != < <= > >=`) over identifiers, numbers,
/// quoted strings and `true`/`false`/`null`, combined with `&&`, `||`,
/// `!` and parentheses, with `+ - * /` arithmetic inside operands.
///
/// Output bodies: `;`-separated `name = expression` assignments. Later
/// assignments see earlier ones; the result holds the assigned names only.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleEvaluator;

impl SimpleEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl ExpressionEvaluator for SimpleEvaluator {
    fn evaluate_guard(&self, expression: &str, inputs: &Bindings) -> Result<bool, EvaluationError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Err(EvaluationError::Syntax("empty guard".into()));
        }
        let value = Parser::new(&tokens, inputs).parse_all()?;
        truthy(&value)
    }

    fn evaluate_outputs(
        &self,
        expression: &str,
        inputs: &Bindings,
    ) -> Result<Bindings, EvaluationError> {
        let tokens = tokenize(expression)?;
        let mut scope = inputs.clone();
        let mut assigned = Bindings::new();

        for statement in tokens.split(|t| *t == Token::Semi) {
            if statement.is_empty() {
                continue;
            }
            let (name, body) = match statement {
                [Token::Ident(name), Token::Assign, body @ ..] if !body.is_empty() => (name, body),
                _ => {
                    return Err(EvaluationError::Syntax(
                        "expected `name = expression`".into(),
                    ))
                }
            };
            let value = Parser::new(body, &scope).parse_all()?;
            scope.insert(name.clone(), value.clone());
            assigned.insert(name.clone(), value);
        }

        Ok(assigned)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Op(&'static str),
    Assign,
    Not,
    LParen,
    RParen,
    Semi,
}

fn tokenize(source: &str) -> Result<Vec<Token>, EvaluationError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    _ => "/",
                }));
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => "<=",
                    ('<', false) => "<",
                    ('>', true) => ">=",
                    _ => ">",
                };
                tokens.push(Token::Op(op));
                i += op.len();
            }
            '&' if next == Some('&') => {
                tokens.push(Token::Op("&&"));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Op("||"));
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(ch) if *ch == quote => break,
                        Some('\\') if i + 1 < chars.len() => {
                            text.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                        None => {
                            return Err(EvaluationError::Syntax("unterminated string".into()))
                        }
                    }
                }
                tokens.push(Token::Str(text));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| EvaluationError::Syntax(format!("bad number '{}'", literal)))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(EvaluationError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )))
            }
        }
    }

    Ok(tokens)
}

/// Recursive-descent evaluator; computes values while parsing.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    scope: &'a Bindings,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], scope: &'a Bindings) -> Self {
        Self {
            tokens,
            pos: 0,
            scope,
        }
    }

    fn parse_all(mut self) -> Result<Value, EvaluationError> {
        let value = self.or()?;
        match self.tokens.get(self.pos) {
            None => Ok(value),
            Some(token) => Err(EvaluationError::Syntax(format!(
                "unexpected token {:?}",
                token
            ))),
        }
    }

    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.and()?;
        while self.peek_op() == Some("||") {
            self.pos += 1;
            let right = self.and()?;
            left = Value::Bool(truthy(&left)? || truthy(&right)?);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.not()?;
        while self.peek_op() == Some("&&") {
            self.pos += 1;
            let right = self.not()?;
            left = Value::Bool(truthy(&left)? && truthy(&right)?);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Value, EvaluationError> {
        if self.tokens.get(self.pos) == Some(&Token::Not) {
            self.pos += 1;
            let value = self.not()?;
            return Ok(Value::Bool(!truthy(&value)?));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value, EvaluationError> {
        let left = self.sum()?;
        let op = match self.peek_op() {
            Some(op @ ("==" | "!=" | "<" | "<=" | ">" | ">=")) => op,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.sum()?;

        let result = match op {
            "==" => left == right,
            "!=" => left != right,
            _ => {
                let ordering = order(&left, &right)?;
                match op {
                    "<" => ordering == Ordering::Less,
                    "<=" => ordering != Ordering::Greater,
                    ">" => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                }
            }
        };
        Ok(Value::Bool(result))
    }

    fn sum(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.term()?;
        while let Some(op @ ("+" | "-")) = self.peek_op() {
            self.pos += 1;
            let right = self.term()?;
            left = arithmetic(op, left, right)?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.unary()?;
        while let Some(op @ ("*" | "/")) = self.peek_op() {
            self.pos += 1;
            let right = self.unary()?;
            left = arithmetic(op, left, right)?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, EvaluationError> {
        if self.peek_op() == Some("-") {
            self.pos += 1;
            return match self.unary()? {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(EvaluationError::TypeMismatch(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, EvaluationError> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| EvaluationError::Syntax("unexpected end of expression".into()))?;
        self.pos += 1;

        match token {
            Token::Number(n) => Ok(Value::Number(*n)),
            Token::Str(s) => Ok(Value::String(s.clone())),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Null => Ok(Value::Null),
            Token::Ident(name) => self
                .scope
                .get(name)
                .map(normalize)
                .ok_or_else(|| EvaluationError::UnknownVariable(name.clone())),
            Token::LParen => {
                let value = self.or()?;
                match self.tokens.get(self.pos) {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(EvaluationError::Syntax("expected ')'".into())),
                }
            }
            other => Err(EvaluationError::Syntax(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }
}

/// JSON scalars compare like their native counterparts.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Json(serde_json::Value::Bool(b)) => Value::Bool(*b),
        Value::Json(serde_json::Value::Number(n)) => n
            .as_f64()
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        Value::Json(serde_json::Value::String(s)) => Value::String(s.clone()),
        Value::Json(serde_json::Value::Null) => Value::Null,
        other => other.clone(),
    }
}

fn truthy(value: &Value) -> Result<bool, EvaluationError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        other => Err(EvaluationError::TypeMismatch(format!(
            "{} is not a condition",
            other.type_name()
        ))),
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, EvaluationError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| EvaluationError::TypeMismatch("NaN is unordered".into())),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(EvaluationError::TypeMismatch(format!(
            "cannot order {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn arithmetic(op: &str, left: Value, right: Value) -> Result<Value, EvaluationError> {
    match (op, left, right) {
        ("+", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        ("-", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        ("*", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        ("/", Value::Number(_), Value::Number(b)) if b == 0.0 => {
            Err(EvaluationError::DivisionByZero)
        }
        ("/", Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        ("+", Value::String(a), b) => Ok(Value::String(a + &display(&b))),
        ("+", a, Value::String(b)) => Ok(Value::String(display(&a) + &b)),
        (op, a, b) => Err(EvaluationError::TypeMismatch(format!(
            "cannot apply '{}' to {} and {}",
            op,
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn guards_compare_and_combine() {
        let eval = SimpleEvaluator::new();
        let inputs = bindings(&[
            ("amount", Value::Number(120.0)),
            ("region", Value::String("eu".into())),
            ("vip", Value::Bool(false)),
        ]);

        assert!(eval.evaluate_guard("amount > 100", &inputs).unwrap());
        assert!(eval
            .evaluate_guard("amount >= 120 && region == 'eu'", &inputs)
            .unwrap());
        assert!(eval.evaluate_guard("vip || amount * 2 > 200", &inputs).unwrap());
        assert!(!eval.evaluate_guard("!(amount > 100)", &inputs).unwrap());
        assert!(eval.evaluate_guard("true", &inputs).unwrap());
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let eval = SimpleEvaluator::new();
        let inputs = Bindings::new();

        assert!(eval.evaluate_guard("true || false && false", &inputs).unwrap());
        assert!(!eval.evaluate_guard("(true || false) && false", &inputs).unwrap());
    }

    #[test]
    fn json_scalars_are_compared_natively() {
        let eval = SimpleEvaluator::new();
        let inputs = bindings(&[("count", Value::Json(serde_json::json!(3)))]);

        assert!(eval.evaluate_guard("count == 3", &inputs).unwrap());
    }

    #[test]
    fn guard_failures_are_reported() {
        let eval = SimpleEvaluator::new();
        let inputs = bindings(&[("name", Value::String("x".into()))]);

        assert_eq!(
            eval.evaluate_guard("missing > 1", &inputs),
            Err(EvaluationError::UnknownVariable("missing".into()))
        );
        assert!(matches!(
            eval.evaluate_guard("name", &inputs),
            Err(EvaluationError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval.evaluate_guard("amount >", &inputs),
            Err(EvaluationError::Syntax(_))
        ));
        assert!(matches!(
            eval.evaluate_guard("", &inputs),
            Err(EvaluationError::Syntax(_))
        ));
    }

    #[test]
    fn outputs_hold_only_assigned_names() {
        let eval = SimpleEvaluator::new();
        let inputs = bindings(&[("x", Value::Number(4.0)), ("who", Value::String("bob".into()))]);

        let out = eval
            .evaluate_outputs("y = x * 2 + 1; greeting = 'hi ' + who; z = y - x;", &inputs)
            .unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(out["y"], Value::Number(9.0));
        assert_eq!(out["greeting"], Value::String("hi bob".into()));
        assert_eq!(out["z"], Value::Number(5.0));
    }

    #[test]
    fn output_errors_surface() {
        let eval = SimpleEvaluator::new();
        let inputs = bindings(&[("x", Value::Number(1.0))]);

        assert_eq!(
            eval.evaluate_outputs("y = x / 0", &inputs),
            Err(EvaluationError::DivisionByZero)
        );
        assert!(matches!(
            eval.evaluate_outputs("x + 1", &inputs),
            Err(EvaluationError::Syntax(_))
        ));
    }
}
