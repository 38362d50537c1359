// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Evaluation of the output size expressions of a scaler.
//!
//! An expression is built from numbers, `+ - * /`, parentheses and the variables `iw`/`in_w` and
//! `ih`/`in_h` (input size), `a` (input aspect ratio) and `ow`/`out_w`, `oh`/`out_h` (the other
//! output dimension).

use std::iter::Peekable;
use std::str::Chars;

use crate::Error;
use crate::Result;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Variable(Variable),
    Plus,
    Minus,
    Star,
    Slash,
    Open,
    Close,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Variable {
    InWidth,
    InHeight,
    Aspect,
    OutWidth,
    OutHeight,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "iw" | "in_w" => Some(Variable::InWidth),
            "ih" | "in_h" => Some(Variable::InHeight),
            "a" => Some(Variable::Aspect),
            "ow" | "out_w" => Some(Variable::OutWidth),
            "oh" | "out_h" => Some(Variable::OutHeight),
            _ => None,
        }
    }
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<Chars> = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        let token = match c {
            ' ' | '\t' => {
                chars.next();
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '(' => Token::Open,
            ')' => Token::Close,
            '0'..='9' | '.' => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    number.push(d);
                    chars.next();
                }
                let value = number
                    .parse()
                    .map_err(|_| format!("bad number '{}'", number))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    name.push(d);
                    chars.next();
                }
                let variable =
                    Variable::from_name(&name).ok_or(format!("unknown variable '{}'", name))?;
                tokens.push(Token::Variable(variable));
                continue;
            }
            c => return Err(format!("unexpected character '{}'", c)),
        };
        tokens.push(token);
        chars.next();
    }
    Ok(tokens)
}

struct Evaluator<'a, F> {
    tokens: &'a [Token],
    pos: usize,
    lookup: F,
}

impl<'a, F: Fn(Variable) -> Option<f64>> Evaluator<'a, F> {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn sum(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.product()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.product()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.product()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn product(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value /= self.unary()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> std::result::Result<f64, String> {
        match self.next() {
            Some(Token::Minus) => Ok(-self.unary()?),
            Some(Token::Plus) => self.unary(),
            Some(Token::Number(value)) => Ok(value),
            Some(Token::Variable(variable)) => {
                (self.lookup)(variable).ok_or_else(|| format!("{:?} is not known yet", variable))
            }
            Some(Token::Open) => {
                let value = self.sum()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("missing ')'".to_owned()),
                }
            }
            Some(token) => Err(format!("unexpected {:?}", token)),
            None => Err("unexpected end of expression".to_owned()),
        }
    }
}

fn evaluate<F: Fn(Variable) -> Option<f64>>(expr: &str, lookup: F) -> Result<f64> {
    let invalid = |reason: String| Error::InvalidExpression {
        expr: expr.to_owned(),
        reason,
    };
    let tokens = tokenize(expr).map_err(invalid)?;
    let mut evaluator = Evaluator {
        tokens: &tokens,
        pos: 0,
        lookup,
    };
    let value = evaluator.sum().map_err(invalid)?;
    if evaluator.pos != tokens.len() {
        return Err(invalid("trailing input".to_owned()));
    }
    if !value.is_finite() {
        return Err(invalid("result is not a finite number".to_owned()));
    }
    Ok(value)
}

/// Evaluates a single expression against an `in_w`x`in_h` input.
pub fn eval_expression(expr: &str, in_w: u32, in_h: u32) -> Result<f64> {
    evaluate(expr, |v| input_variable(v, in_w, in_h))
}

fn input_variable(variable: Variable, in_w: u32, in_h: u32) -> Option<f64> {
    match variable {
        Variable::InWidth => Some(in_w as f64),
        Variable::InHeight => Some(in_h as f64),
        Variable::Aspect if in_h > 0 => Some(in_w as f64 / in_h as f64),
        _ => None,
    }
}

// Rounds `value * num / den` to the nearest integer, halves away from zero.
fn rescale(value: i64, num: i64, den: i64) -> i64 {
    let product = value as i128 * num as i128;
    let den = den as i128;
    let rounded = if product >= 0 {
        (product + den / 2) / den
    } else {
        (product - den / 2) / den
    };
    rounded as i64
}

/// Computes the output size of a scaler from its width and height expressions.
///
/// A dimension evaluating to 0 takes the input's. A negative dimension `-n` is derived from the
/// other one so as to keep the input aspect ratio, rounded to a multiple of `n`. If both are
/// negative the input size is kept.
pub fn eval_dimensions(w_expr: &str, h_expr: &str, in_w: u32, in_h: u32) -> Result<(u32, u32)> {
    if in_w == 0 || in_h == 0 {
        return Err(Error::InvalidDimensions {
            width: in_w as i64,
            height: in_h as i64,
        });
    }
    let substitute = |value: f64, input: u32| -> i64 {
        match value as i64 {
            0 => input as i64,
            v => v,
        }
    };
    // Either expression may refer to the other dimension: evaluate the width, then the height,
    // then the width again.
    let first_w = evaluate(w_expr, |v| input_variable(v, in_w, in_h)).ok();
    let h = evaluate(h_expr, |v| match v {
        Variable::OutWidth => first_w.map(|w| substitute(w, in_w) as f64),
        v => input_variable(v, in_w, in_h),
    })?;
    let h = substitute(h, in_h);
    let w = evaluate(w_expr, |v| match v {
        Variable::OutHeight => Some(h as f64),
        v => input_variable(v, in_w, in_h),
    })?;
    let mut w = substitute(w, in_w);
    let mut h = h;

    let factor_w = if w < -1 { -w } else { 1 };
    let factor_h = if h < -1 { -h } else { 1 };
    if w < 0 && h < 0 {
        w = in_w as i64;
        h = in_h as i64;
    }
    if w < 0 {
        w = rescale(h, in_w as i64, in_h as i64 * factor_w) * factor_w;
    }
    if h < 0 {
        h = rescale(w, in_h as i64, in_w as i64 * factor_h) * factor_h;
    }

    let valid = |v: i64| v > 0 && v <= i32::MAX as i64;
    if !valid(w) || !valid(h) {
        return Err(Error::InvalidDimensions {
            width: w,
            height: h,
        });
    }
    Ok((w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        assert_eq!(eval_expression("iw/2", 1920, 1080).unwrap(), 960.0);
        assert_eq!(eval_expression("(in_w + 8) * 2 - -4", 8, 8).unwrap(), 36.0);
        assert_eq!(eval_expression("ih*a", 1920, 1080).unwrap(), 1920.0);
        assert_eq!(eval_expression(" 1.5 * 4 ", 1, 1).unwrap(), 6.0);
    }

    #[test]
    fn malformed_expressions() {
        for expr in ["", "iw/", "(iw", "iw)", "foo", "iw $ 2", "1/0", "ow"] {
            assert!(
                matches!(
                    eval_expression(expr, 1920, 1080),
                    Err(Error::InvalidExpression { .. })
                ),
                "{}",
                expr
            );
        }
    }

    #[test]
    fn half_size() {
        assert_eq!(
            eval_dimensions("iw/2", "ih/2", 1920, 1080).unwrap(),
            (960, 540)
        );
    }

    #[test]
    fn zero_keeps_the_input_size() {
        assert_eq!(eval_dimensions("0", "0", 1280, 720).unwrap(), (1280, 720));
        assert_eq!(eval_dimensions("640", "0", 1280, 720).unwrap(), (640, 720));
    }

    #[test]
    fn negative_keeps_the_aspect_ratio() {
        assert_eq!(
            eval_dimensions("1280", "-1", 1920, 1080).unwrap(),
            (1280, 720)
        );
        assert_eq!(eval_dimensions("-2", "405", 1920, 1080).unwrap(), (720, 405));
        assert_eq!(eval_dimensions("-4", "405", 1920, 1080).unwrap(), (720, 405));
        assert_eq!(eval_dimensions("-16", "400", 1920, 1080).unwrap(), (704, 400));
        assert_eq!(eval_dimensions("-1", "-1", 640, 480).unwrap(), (640, 480));
    }

    #[test]
    fn dimensions_may_refer_to_each_other() {
        assert_eq!(eval_dimensions("oh*2", "360", 1920, 1080).unwrap(), (720, 360));
        assert_eq!(eval_dimensions("640", "ow/2", 1920, 1080).unwrap(), (640, 320));
    }

    #[test]
    fn unusable_sizes() {
        assert!(matches!(
            eval_dimensions("iw", "ih*3000000", 1920, 1080),
            Err(Error::InvalidDimensions { .. })
        ));
        assert!(eval_dimensions("iw", "ih", 0, 1080).is_err());
    }
}
