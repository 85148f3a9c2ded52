//! Tokenizer and recursive-descent parser for model formulas.

use super::{FixedTerm, ModelSpec, RandomTerm, Variable};
use crate::error::{MixlmError, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Tilde,
    Plus,
    Minus,
    Colon,
    Star,
    Bar,
    DoubleBar,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '~' => {
                tokens.push(Token::Tilde);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::DoubleBar);
                    i += 2;
                } else {
                    tokens.push(Token::Bar);
                    i += 1;
                }
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' || c == '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(MixlmError::Specification(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token, context: &str) -> Result<()> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => Err(MixlmError::Specification(format!(
                "expected {:?} {}, found {:?}",
                want, context, t
            ))),
            None => Err(MixlmError::Specification(format!(
                "expected {:?} {}, found end of formula",
                want, context
            ))),
        }
    }

    fn ident(&mut self, context: &str) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(MixlmError::Specification(format!(
                "expected a variable name {}, found {:?}",
                context, other
            ))),
        }
    }

    /// `name` or `scale(name)`.
    fn variable(&mut self) -> Result<Variable> {
        let name = self.ident("in term")?;
        if name == "scale" && self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.ident("inside scale()")?;
            self.expect(Token::RParen, "to close scale(")?;
            Ok(Variable::scaled(&inner))
        } else {
            Ok(Variable::raw(&name))
        }
    }

    /// Colon-joined chains separated by `*`, expanded into terms.
    fn product(&mut self) -> Result<Vec<FixedTerm>> {
        let mut groups: Vec<Vec<Variable>> = vec![vec![self.variable()?]];
        loop {
            match self.peek() {
                Some(Token::Colon) => {
                    self.next();
                    let v = self.variable()?;
                    if let Some(last) = groups.last_mut() {
                        last.push(v);
                    }
                }
                Some(Token::Star) => {
                    self.next();
                    groups.push(vec![self.variable()?]);
                }
                _ => break,
            }
        }
        Ok(expand_crossing(&groups))
    }

    /// Contents of `( ... | group )` after the opening parenthesis.
    fn random_term(&mut self) -> Result<RandomTerm> {
        let mut intercept = true;
        let mut slopes = Vec::new();
        let mut negate = false;
        loop {
            match self.next() {
                Some(Token::Number(n)) if n == "1" => intercept = !negate,
                Some(Token::Number(n)) if n == "0" => intercept = negate && intercept,
                Some(Token::Ident(name)) => {
                    self.pos -= 1;
                    if negate {
                        return Err(MixlmError::Specification(format!(
                            "cannot remove '{}' inside a random term",
                            name
                        )));
                    }
                    slopes.push(self.variable()?);
                }
                other => {
                    return Err(MixlmError::Specification(format!(
                        "unexpected {:?} in random-effect term",
                        other
                    )))
                }
            }
            negate = false;
            match self.next() {
                Some(Token::Plus) => {}
                Some(Token::Minus) => negate = true,
                Some(Token::Bar) | Some(Token::DoubleBar) => {
                    self.pos -= 1;
                    break;
                }
                other => {
                    return Err(MixlmError::Specification(format!(
                        "expected '+', '|' or '||' in random-effect term, found {:?}",
                        other
                    )))
                }
            }
        }
        let correlated = match self.next() {
            Some(Token::Bar) => true,
            Some(Token::DoubleBar) => false,
            _ => unreachable!("loop exits only on a bar token"),
        };
        let group = self.ident("after '|'")?;
        if self.peek() == Some(&Token::Colon) || self.peek() == Some(&Token::Ident("/".into())) {
            return Err(MixlmError::Specification(
                "interaction grouping factors are not supported; build a combined column".into(),
            ));
        }
        self.expect(Token::RParen, "to close random-effect term")?;

        // `(1 + x || g)` with duplicates is rejected by validation; keep order.
        let mut unique: Vec<Variable> = Vec::new();
        for s in slopes {
            if !unique.contains(&s) {
                unique.push(s);
            }
        }
        Ok(RandomTerm {
            intercept,
            slopes: unique,
            group,
            correlated,
        })
    }
}

/// `a*b*c` over colon groups: every non-empty subset, smaller subsets first.
fn expand_crossing(groups: &[Vec<Variable>]) -> Vec<FixedTerm> {
    let n = groups.len();
    let mut subsets: Vec<Vec<usize>> = (1u32..(1 << n))
        .map(|mask| (0..n).filter(|i| mask & (1 << i) != 0).collect())
        .collect();
    subsets.sort_by_key(|s| s.len());
    subsets
        .into_iter()
        .map(|s| {
            let mut factors: Vec<Variable> = Vec::new();
            for i in s {
                for v in &groups[i] {
                    if !factors.contains(v) {
                        factors.push(v.clone());
                    }
                }
            }
            FixedTerm { factors }
        })
        .collect()
}

pub(super) fn parse_formula(input: &str) -> Result<ModelSpec> {
    let tokens = tokenize(input)?;
    let mut p = Parser { tokens, pos: 0 };

    let response = p.ident("as the response")?;
    p.expect(Token::Tilde, "after the response")?;

    let mut intercept = true;
    let mut fixed: Vec<FixedTerm> = Vec::new();
    let mut random: Vec<RandomTerm> = Vec::new();
    let mut negate = false;

    loop {
        match p.peek().cloned() {
            Some(Token::Number(n)) if n == "1" || n == "0" => {
                p.next();
                intercept = (n == "1") != negate;
            }
            Some(Token::LParen) => {
                p.next();
                if negate {
                    return Err(MixlmError::Specification(
                        "random-effect terms cannot be removed with '-'".into(),
                    ));
                }
                random.push(p.random_term()?);
            }
            Some(Token::Ident(_)) => {
                if negate {
                    return Err(MixlmError::Specification(
                        "only the intercept can be removed with '-'".into(),
                    ));
                }
                for term in p.product()? {
                    if !fixed.contains(&term) {
                        fixed.push(term);
                    }
                }
            }
            other => {
                return Err(MixlmError::Specification(format!(
                    "expected a term, found {:?}",
                    other
                )))
            }
        }
        negate = false;
        match p.next() {
            None => break,
            Some(Token::Plus) => {}
            Some(Token::Minus) => negate = true,
            Some(t) => {
                return Err(MixlmError::Specification(format!(
                    "expected '+' or '-' between terms, found {:?}",
                    t
                )))
            }
        }
    }

    Ok(ModelSpec {
        response,
        intercept,
        fixed,
        random,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_double_bar() {
        let t = tokenize("(1||g)").unwrap();
        assert_eq!(
            t,
            vec![
                Token::LParen,
                Token::Number("1".into()),
                Token::DoubleBar,
                Token::Ident("g".into()),
                Token::RParen
            ]
        );
    }

    #[test]
    fn test_parse_fixed_only() {
        let spec = parse_formula("y ~ age + female").unwrap();
        assert_eq!(spec.response, "y");
        assert!(spec.intercept);
        assert_eq!(spec.fixed.len(), 2);
        assert!(spec.random.is_empty());
    }

    #[test]
    fn test_star_expansion() {
        let spec = parse_formula("y ~ a*b").unwrap();
        let terms: Vec<String> = spec.fixed.iter().map(|t| t.to_string()).collect();
        assert_eq!(terms, vec!["a", "b", "a:b"]);
    }

    #[test]
    fn test_remove_intercept() {
        assert!(!parse_formula("y ~ x - 1").unwrap().intercept);
        assert!(!parse_formula("y ~ 0 + x").unwrap().intercept);
        assert!(parse_formula("y ~ 1 + x").unwrap().intercept);
    }

    #[test]
    fn test_random_terms() {
        let spec = parse_formula("y ~ x + (1 + scale(x) | state) + (0 + x || cohort)").unwrap();
        assert_eq!(spec.random.len(), 2);
        let a = &spec.random[0];
        assert!(a.intercept && a.correlated);
        assert_eq!(a.slopes, vec![Variable::scaled("x")]);
        let b = &spec.random[1];
        assert!(!b.intercept && !b.correlated);
        assert_eq!(b.group, "cohort");
    }

    #[test]
    fn test_slope_only_implies_intercept() {
        let spec = parse_formula("y ~ x + (x | g)").unwrap();
        assert!(spec.random[0].intercept);
        let spec = parse_formula("y ~ x + (x - 1 | g)").unwrap();
        assert!(!spec.random[0].intercept);
    }

    #[test]
    fn test_errors() {
        assert!(parse_formula("~ x").is_err());
        assert!(parse_formula("y ~ x +").is_err());
        assert!(parse_formula("y ~ x - z").is_err());
        assert!(parse_formula("y ~ (1 + x)").is_err());
        assert!(parse_formula("y ~ (1 | g:h)").is_err());
        assert!(parse_formula("y ~ x $ z").is_err());
    }
}
