//! Calculator 工具：安全的算术表达式求值
//!
//! 先做字符白名单检查（数字、`+-*/().%` 与空格），任何非法字符直接拒绝、不做求值；
//! 通过后用递归下降解析求值。运算符优先级（由低到高）：
//! `+ -` < `* / // %` < 一元 `+ -` < `**`（右结合，指数可带一元符号）。
//! 整数与浮点分开：`/` 恒为浮点，`//` 向下取整，`%` 结果符号随除数。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::tools::schema::parameters_schema_for;
use crate::tools::{Tool, ToolFault, ToolResult};

const ALLOWED_CHARS: &str = "0123456789+-*/(). %";

/// 一元符号与括号的最大嵌套层数
const MAX_DEPTH: usize = 200;

/// 求值错误（作为 ok:false 的 error 文本返回给模型）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("illegal characters")]
    IllegalCharacters,

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow")]
    Overflow,

    #[error("math domain error: {0}")]
    Domain(String),
}

/// 求值结果：保留整数 / 浮点区别
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn to_json(self) -> Value {
        match self {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

/// 求值入口：白名单检查 -> 词法 -> 语法 -> 结果有限性检查
pub fn evaluate(expression: &str) -> Result<Number, CalcError> {
    if expression.chars().any(|c| !ALLOWED_CHARS.contains(c)) {
        return Err(CalcError::IllegalCharacters);
    }
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Syntax("empty expression".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(CalcError::Syntax(format!("unexpected token {:?}", tok)));
    }
    match value {
        Number::Float(f) if !f.is_finite() => Err(CalcError::Overflow),
        v => Ok(v),
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&literal)?));
                continue;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 1;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            other => return Err(CalcError::Syntax(format!("unexpected character '{other}'"))),
        }
        i += 1;
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Number, CalcError> {
    if literal.contains('.') {
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::Syntax(format!("invalid number '{literal}'")))
    } else {
        literal.parse::<i64>().map(Number::Int).map_err(|_| CalcError::Overflow)
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    /// 进入一层嵌套；超过 MAX_DEPTH 视为语法错误
    fn nested<F>(&mut self, f: F) -> Result<Number, CalcError>
    where
        F: FnOnce(&mut Self) -> Result<Number, CalcError>,
    {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::Syntax("expression too deeply nested".to_string()));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut lhs = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Number, CalcError> {
        let mut lhs = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent)) =
            self.peek()
        {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                negate(self.nested(Self::unary)?)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(Token::DoubleStar) {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.bump() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let inner = self.nested(Self::expr)?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(CalcError::Syntax("missing ')'".to_string())),
                }
            }
            Some(tok) => Err(CalcError::Syntax(format!("unexpected token {:?}", tok))),
            None => Err(CalcError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

fn negate(n: Number) -> Result<Number, CalcError> {
    match n {
        Number::Int(i) => i.checked_neg().map(Number::Int).ok_or(CalcError::Overflow),
        Number::Float(f) => Ok(Number::Float(-f)),
    }
}

fn binary(op: Token, lhs: Number, rhs: Number) -> Result<Number, CalcError> {
    use Number::{Float, Int};

    if matches!(op, Token::Slash | Token::DoubleSlash | Token::Percent) && rhs.is_zero() {
        return Err(CalcError::DivisionByZero);
    }

    match (op, lhs, rhs) {
        (Token::Slash, a, b) => Ok(Float(a.as_f64() / b.as_f64())),
        (Token::Plus, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or(CalcError::Overflow),
        (Token::Minus, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or(CalcError::Overflow),
        (Token::Star, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or(CalcError::Overflow),
        (Token::DoubleSlash, Int(a), Int(b)) => {
            let q = a.checked_div(b).ok_or(CalcError::Overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                Ok(Int(q - 1))
            } else {
                Ok(Int(q))
            }
        }
        (Token::Percent, Int(a), Int(b)) => {
            // 除数非零；i64::MIN % -1 取 0
            let r = a.wrapping_rem(b);
            if r != 0 && ((r < 0) != (b < 0)) {
                Ok(Int(r + b))
            } else {
                Ok(Int(r))
            }
        }
        (op, a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let v = match op {
                Token::Plus => a + b,
                Token::Minus => a - b,
                Token::Star => a * b,
                Token::DoubleSlash => (a / b).floor(),
                Token::Percent => {
                    let r = a % b;
                    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                        r + b
                    } else {
                        r
                    }
                }
                other => return Err(CalcError::Syntax(format!("unexpected operator {:?}", other))),
            };
            Ok(Float(v))
        }
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, CalcError> {
    match (base, exponent) {
        (Number::Int(b), Number::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| CalcError::Overflow)?;
            b.checked_pow(e).map(Number::Int).ok_or(CalcError::Overflow)
        }
        (b, e) => {
            let (b, e) = (b.as_f64(), e.as_f64());
            if b == 0.0 && e < 0.0 {
                return Err(CalcError::DivisionByZero);
            }
            if b < 0.0 && e.fract() != 0.0 {
                return Err(CalcError::Domain(
                    "negative number raised to a fractional power".to_string(),
                ));
            }
            Ok(Number::Float(b.powf(e)))
        }
    }
}

/// calculator 参数
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CalculatorArgs {
    /// 数学表达式，如 `12.5 * (3 + 4)`
    pub expression: String,
}

/// Calculator 工具
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Safely evaluate a math expression. Returns JSON with {ok,result|error}."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<CalculatorArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolFault> {
        let args: CalculatorArgs = serde_json::from_value(args)?;
        Ok(match evaluate(&args.expression) {
            Ok(n) => ToolResult::success("result", n.to_json()),
            Err(e) => ToolResult::failure(e.to_string()),
        })
    }
}
