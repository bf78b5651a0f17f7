//! Datalog parser
//!
//! Supports:
//! - Terms: variables (X, Y, _tmp), constants ("foo", 42, -7, bare), wildcard (_)
//! - Atoms: predicate(arg1, arg2, ...)
//! - Literals: atom, !atom or \+ atom, comparisons (X != Y, N < 10),
//!   builtins contains/starts_with/match
//! - Rules: head :- body. or head.
//! - Directives: .decl, .input, .output
//! - Comments: % line, // line, /* block */

use std::collections::BTreeMap;

use crate::datalog::types::*;

/// Parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: &str, position: usize) -> Self {
        ParseError {
            message: message.to_string(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error at {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parser state
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn remaining(&self) -> &str {
        &self.input[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn skip_line(&mut self) {
        match self.remaining().find('\n') {
            Some(offset) => self.pos += offset + 1,
            None => self.pos = self.input.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current_char() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else if c == '%' || self.remaining().starts_with("//") {
                self.skip_line();
            } else if self.remaining().starts_with("/*") {
                match self.remaining()[2..].find("*/") {
                    Some(offset) => self.pos += offset + 4,
                    None => self.pos = self.input.len(),
                }
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.current_char()
    }

    fn expect(&mut self, expected: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.remaining().starts_with(expected) {
            self.pos += expected.len();
            Ok(())
        } else {
            Err(ParseError::new(
                &format!("expected '{}'", expected),
                self.pos,
            ))
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        while let Some(c) = self.current_char() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(ParseError::new("expected identifier", self.pos));
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.expect("\"")?;

        let start = self.pos;
        let mut value = String::new();
        let input = self.input;
        let mut chars = input[self.pos..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(value);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                },
                _ => value.push(c),
            }
        }

        Err(ParseError::new("unterminated string", start))
    }

    fn parse_number(&mut self) -> Result<i64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        if self.remaining().starts_with('-') {
            self.pos += 1;
        }
        while let Some(c) = self.current_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos]
            .parse::<i64>()
            .map_err(|_| ParseError::new("invalid number", start))
    }

    fn starts_number(&self) -> bool {
        let rest = self.remaining();
        let digits = rest.strip_prefix('-').unwrap_or(rest);
        digits.starts_with(|c: char| c.is_ascii_digit())
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        let c = self.peek().ok_or_else(|| ParseError::new("unexpected end", self.pos))?;

        if c == '_' && !self.remaining()[1..].starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
            Ok(Term::Wildcard)
        } else if c == '"' {
            let s = self.parse_string()?;
            Ok(Term::Const(Value::Symbol(s)))
        } else if self.starts_number() {
            Ok(Term::Const(Value::Number(self.parse_number()?)))
        } else if c.is_uppercase() || c == '_' {
            let name = self.parse_identifier()?;
            Ok(Term::Var(name))
        } else if c.is_lowercase() {
            // Bare lowercase identifiers are symbol constants
            let name = self.parse_identifier()?;
            Ok(Term::Const(Value::Symbol(name)))
        } else {
            Err(ParseError::new(&format!("unexpected character '{}'", c), self.pos))
        }
    }

    fn parse_term_list(&mut self, close: char) -> Result<Vec<Term>, ParseError> {
        let mut args = Vec::new();

        if self.peek() != Some(close) {
            args.push(self.parse_term()?);

            while self.peek() == Some(',') {
                self.expect(",")?;
                args.push(self.parse_term()?);
            }
        }

        Ok(args)
    }

    fn parse_atom(&mut self) -> Result<Atom, ParseError> {
        let predicate = self.parse_identifier()?;

        if self.peek() != Some('(') {
            // No args
            return Ok(Atom::new(&predicate, vec![]));
        }

        self.expect("(")?;
        let args = self.parse_term_list(')')?;
        self.expect(")")?;

        Ok(Atom::new(&predicate, args))
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, ParseError> {
        self.skip_whitespace();
        const OPS: [(&str, CompareOp); 6] = [
            ("<=", CompareOp::Le),
            (">=", CompareOp::Ge),
            ("!=", CompareOp::Ne),
            ("=", CompareOp::Eq),
            ("<", CompareOp::Lt),
            (">", CompareOp::Gt),
        ];
        for (text, op) in OPS {
            if self.remaining().starts_with(text) {
                self.pos += text.len();
                return Ok(op);
            }
        }
        Err(ParseError::new("expected comparison operator", self.pos))
    }

    fn starts_compare_op(&mut self) -> bool {
        self.skip_whitespace();
        let rest = self.remaining();
        rest.starts_with('=')
            || rest.starts_with("!=")
            || rest.starts_with('<')
            || rest.starts_with('>')
    }

    fn parse_comparison(&mut self) -> Result<Constraint, ParseError> {
        let left = self.parse_term()?;
        let op = self.parse_compare_op()?;
        let right = self.parse_term()?;
        Ok(Constraint::new(op, left, right))
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        self.skip_whitespace();

        // Check for negation
        let negation = if self.remaining().starts_with("\\+") {
            2
        } else if self.remaining().starts_with('!') && !self.remaining().starts_with("!=") {
            1
        } else {
            0
        };
        if negation > 0 {
            self.pos += negation;
            let atom = self.parse_atom()?;
            return Ok(Literal::Negative(atom));
        }

        let c = self.peek().ok_or_else(|| ParseError::new("unexpected end", self.pos))?;
        if !(c.is_alphabetic() || c == '_') {
            return Ok(Literal::Constraint(self.parse_comparison()?));
        }

        // Identifier: atom when followed by '(' or not followed by an operator
        let start = self.pos;
        let name = self.parse_identifier()?;
        let is_call = self.peek() == Some('(');
        let is_comparison = !is_call && self.starts_compare_op();
        self.pos = start;

        if is_comparison {
            return Ok(Literal::Constraint(self.parse_comparison()?));
        }

        let atom = self.parse_atom()?;
        match CompareOp::from_builtin(&name) {
            Some(op) if is_call => {
                if atom.arity() != 2 {
                    return Err(ParseError::new(
                        &format!("builtin '{}' takes 2 arguments", name),
                        start,
                    ));
                }
                let args = atom.args();
                Ok(Literal::Constraint(Constraint::new(op, args[0].clone(), args[1].clone())))
            }
            _ => Ok(Literal::Positive(atom)),
        }
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        let head = self.parse_atom()?;

        self.skip_whitespace();

        // Check for :- (rule with body) or . (fact)
        if self.remaining().starts_with(":-") {
            self.pos += 2;

            let mut body = Vec::new();
            body.push(self.parse_literal()?);

            while self.peek() == Some(',') {
                self.expect(",")?;
                body.push(self.parse_literal()?);
            }

            self.expect(".")?;
            Ok(Rule::new(head, body))
        } else {
            self.expect(".")?;
            Ok(Rule::fact(head))
        }
    }

    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        let name = self.parse_identifier()?;
        self.expect("(")?;

        let mut attributes = Vec::new();
        if self.peek() != Some(')') {
            loop {
                let attr_name = self.parse_identifier()?;
                self.expect(":")?;
                let type_pos = self.pos;
                let type_name = self.parse_identifier()?;
                let ty = ColumnType::from_name(&type_name).ok_or_else(|| {
                    ParseError::new(&format!("unknown type '{}'", type_name), type_pos)
                })?;
                attributes.push(Attribute { name: attr_name, ty });

                if self.peek() == Some(',') {
                    self.expect(",")?;
                } else {
                    break;
                }
            }
        }
        self.expect(")")?;

        Ok(Declaration { name, attributes })
    }

    fn parse_io_directives(&mut self, kind: IoKind) -> Result<Vec<IoDirective>, ParseError> {
        let mut directives = Vec::new();

        loop {
            let relation = self.parse_identifier()?;
            let mut directive = IoDirective::new(kind, &relation);

            if self.peek() == Some('(') {
                self.expect("(")?;
                directive.params = self.parse_io_params()?;
                self.expect(")")?;
            }
            directives.push(directive);

            if self.peek() == Some(',') {
                self.expect(",")?;
            } else {
                break;
            }
        }

        Ok(directives)
    }

    fn parse_io_params(&mut self) -> Result<BTreeMap<String, String>, ParseError> {
        let mut params = BTreeMap::new();
        if self.peek() == Some(')') {
            return Ok(params);
        }

        loop {
            let key = self.parse_identifier()?;
            self.expect("=")?;
            let value = if self.peek() == Some('"') {
                self.parse_string()?
            } else {
                self.parse_identifier()?
            };
            params.insert(key, value);

            if self.peek() == Some(',') {
                self.expect(",")?;
            } else {
                break;
            }
        }

        Ok(params)
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut declarations = Vec::new();
        let mut directives = Vec::new();
        let mut rules = Vec::new();

        loop {
            match self.peek() {
                None => break,
                Some('.') => {
                    let start = self.pos;
                    self.pos += 1;
                    let keyword = self.parse_identifier()?;
                    match keyword.as_str() {
                        "decl" => declarations.push(self.parse_declaration()?),
                        "input" => directives.extend(self.parse_io_directives(IoKind::Input)?),
                        "output" => directives.extend(self.parse_io_directives(IoKind::Output)?),
                        other => {
                            return Err(ParseError::new(
                                &format!("unknown directive '.{}'", other),
                                start,
                            ))
                        }
                    }
                }
                Some(_) => rules.push(self.parse_rule()?),
            }
        }

        Ok(Program::with_parts(declarations, directives, rules))
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a single term
pub fn parse_term(input: &str) -> Result<Term, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_term()
}

/// Parse a single atom
pub fn parse_atom(input: &str) -> Result<Atom, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_atom()
}

/// Parse a single literal
pub fn parse_literal(input: &str) -> Result<Literal, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_literal()
}

/// Parse a single rule
pub fn parse_rule(input: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_rule()
}

/// Parse a complete program
pub fn parse_program(input: &str) -> Result<Program, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_program()
}
