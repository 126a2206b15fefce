//! Query document parser
//!
//! Supports the executable subset of GraphQL the cache needs:
//! - Operations: `query`/`mutation`/`subscription` with name and variable
//!   definitions (defaults included), or the anonymous `{ ... }` shorthand
//! - Fragments: `fragment Name on Type { ... }`, spreads and inline fragments
//! - Fields: aliases, arguments, nested selections
//! - Values: variables, ints, floats, strings, booleans, null, enums, lists, objects
//! - Directives are parsed and discarded; commas and `#` comments are ignored

use std::collections::BTreeMap;

use crate::query::types::*;
use crate::value::JsonValue;

/// Parse error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(message: &str, position: usize) -> Self {
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

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.remaining().chars().next() {
            if c.is_whitespace() || c == ',' || c == '\u{feff}' {
                self.pos += c.len_utf8();
            } else if c == '#' {
                // Skip comment to end of line
                let line_len = self.remaining().find('\n').unwrap_or(self.remaining().len());
                self.pos += line_len;
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.remaining().chars().next()
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn expect(&mut self, expected: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.remaining().starts_with(expected) {
            self.pos += expected.len();
            Ok(())
        } else {
            Err(ParseError::new(&format!("expected '{}'", expected), self.pos))
        }
    }

    /// Consume `token` if it is next
    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.remaining().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Next name without consuming it
    fn peek_name(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.remaining();
        if !rest.starts_with(is_name_start) {
            return None;
        }
        let len = rest.find(|c: char| !is_name_continue(c)).unwrap_or(rest.len());
        Some(&rest[..len])
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        match self.peek_name() {
            Some(name) => {
                self.pos += name.len();
                Ok(name.to_string())
            }
            None => Err(ParseError::new("expected name", self.pos)),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_name() == Some(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn parse_string(&mut self) -> Result<String, ParseError> {
        self.expect("\"")?;
        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.remaining().char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Ok(value);
                }
                '\\' => {
                    let escaped = match chars.next() {
                        Some((_, '"')) => '"',
                        Some((_, '\\')) => '\\',
                        Some((_, '/')) => '/',
                        Some((_, 'b')) => '\u{0008}',
                        Some((_, 'f')) => '\u{000c}',
                        Some((_, 'n')) => '\n',
                        Some((_, 'r')) => '\r',
                        Some((_, 't')) => '\t',
                        Some((_, 'u')) => {
                            let mut code = String::new();
                            for _ in 0..4 {
                                if let Some((_, h)) = chars.next() {
                                    code.push(h);
                                }
                            }
                            u32::from_str_radix(&code, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| ParseError::new("invalid unicode escape", start + offset))?
                        }
                        _ => return Err(ParseError::new("invalid escape sequence", start + offset)),
                    };
                    value.push(escaped);
                }
                '\n' => return Err(ParseError::new("unterminated string", start)),
                c => value.push(c),
            }
        }

        Err(ParseError::new("unterminated string", start))
    }

    fn parse_number(&mut self) -> Result<JsonValue, ParseError> {
        let start = self.pos;
        let rest = self.remaining();
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
            .unwrap_or(rest.len());
        let text = &rest[..len];
        self.pos += len;

        if text.contains(['.', 'e', 'E']) {
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| ParseError::new(&format!("invalid float '{}'", text), start))
        } else {
            text.parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| ParseError::new(&format!("invalid int '{}'", text), start))
        }
    }

    fn parse_value(&mut self) -> Result<ArgumentValue, ParseError> {
        let c = self.peek().ok_or_else(|| ParseError::new("unexpected end", self.pos))?;

        match c {
            '$' => {
                self.pos += 1;
                Ok(ArgumentValue::Variable(self.parse_name()?))
            }
            '"' => Ok(ArgumentValue::Literal(JsonValue::String(self.parse_string()?))),
            '[' => {
                self.expect("[")?;
                let mut items = Vec::new();
                while !self.eat("]") {
                    if self.at_end() {
                        return Err(ParseError::new("unterminated list", self.pos));
                    }
                    items.push(self.parse_value()?);
                }
                Ok(ArgumentValue::List(items))
            }
            '{' => {
                self.expect("{")?;
                let mut fields = BTreeMap::new();
                while !self.eat("}") {
                    let name = self.parse_name()?;
                    self.expect(":")?;
                    fields.insert(name, self.parse_value()?);
                }
                Ok(ArgumentValue::Object(fields))
            }
            c if c == '-' || c.is_ascii_digit() => Ok(ArgumentValue::Literal(self.parse_number()?)),
            c if is_name_start(c) => {
                let name = self.parse_name()?;
                let literal = match name.as_str() {
                    "true" => JsonValue::Bool(true),
                    "false" => JsonValue::Bool(false),
                    "null" => JsonValue::Null,
                    // Enum values are stored by name
                    _ => JsonValue::String(name),
                };
                Ok(ArgumentValue::Literal(literal))
            }
            c => Err(ParseError::new(&format!("unexpected character '{}'", c), self.pos)),
        }
    }

    fn parse_arguments(&mut self) -> Result<Arguments, ParseError> {
        let mut arguments = Arguments::new();
        if !self.eat("(") {
            return Ok(arguments);
        }
        while !self.eat(")") {
            let name = self.parse_name()?;
            self.expect(":")?;
            arguments.insert(name, self.parse_value()?);
        }
        Ok(arguments)
    }

    fn skip_directives(&mut self) -> Result<(), ParseError> {
        while self.eat("@") {
            self.parse_name()?;
            self.parse_arguments()?;
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<String, ParseError> {
        let mut type_name = if self.eat("[") {
            let inner = self.parse_type()?;
            self.expect("]")?;
            format!("[{}]", inner)
        } else {
            self.parse_name()?
        };
        if self.eat("!") {
            type_name.push('!');
        }
        Ok(type_name)
    }

    fn parse_variable_definitions(&mut self) -> Result<Vec<VariableDefinition>, ParseError> {
        let mut definitions = Vec::new();
        if !self.eat("(") {
            return Ok(definitions);
        }
        while !self.eat(")") {
            self.expect("$")?;
            let name = self.parse_name()?;
            self.expect(":")?;
            let type_name = self.parse_type()?;
            let default_value = if self.eat("=") { Some(self.parse_value()?) } else { None };
            if default_value.as_ref().map_or(false, |v| v.has_variables()) {
                return Err(ParseError::new("default values cannot reference variables", self.pos));
            }
            self.skip_directives()?;
            definitions.push(VariableDefinition {
                name,
                type_name,
                default_value,
            });
        }
        Ok(definitions)
    }

    fn parse_selection_set(&mut self) -> Result<SelectionSet, ParseError> {
        self.expect("{")?;
        let mut selections = Vec::new();
        while !self.eat("}") {
            if self.at_end() {
                return Err(ParseError::new("unterminated selection set", self.pos));
            }
            selections.push(self.parse_selection()?);
        }
        if selections.is_empty() {
            return Err(ParseError::new("empty selection set", self.pos));
        }
        Ok(selections)
    }

    fn parse_selection(&mut self) -> Result<Selection, ParseError> {
        if self.eat("...") {
            if self.eat_keyword("on") {
                let type_condition = self.parse_name()?;
                self.skip_directives()?;
                let selection_set = self.parse_selection_set()?;
                return Ok(Selection::InlineFragment {
                    type_condition: Some(type_condition),
                    selection_set,
                });
            }
            if matches!(self.peek(), Some('{') | Some('@')) {
                self.skip_directives()?;
                let selection_set = self.parse_selection_set()?;
                return Ok(Selection::InlineFragment {
                    type_condition: None,
                    selection_set,
                });
            }
            let name = self.parse_name()?;
            self.skip_directives()?;
            return Ok(Selection::FragmentSpread(name));
        }

        Ok(Selection::Field(self.parse_field()?))
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        let first = self.parse_name()?;
        let (alias, name) = if self.eat(":") {
            (Some(first), self.parse_name()?)
        } else {
            (None, first)
        };
        let arguments = self.parse_arguments()?;
        self.skip_directives()?;
        let selection_set = if self.peek() == Some('{') {
            Some(self.parse_selection_set()?)
        } else {
            None
        };

        Ok(Field {
            alias,
            name,
            arguments,
            selection_set,
        })
    }

    fn parse_operation(&mut self) -> Result<OperationDefinition, ParseError> {
        if self.peek() == Some('{') {
            return Ok(OperationDefinition {
                operation: OperationType::Query,
                name: None,
                variables: Vec::new(),
                selection_set: self.parse_selection_set()?,
            });
        }

        let operation = match self.parse_name()?.as_str() {
            "query" => OperationType::Query,
            "mutation" => OperationType::Mutation,
            "subscription" => OperationType::Subscription,
            other => return Err(ParseError::new(&format!("unknown operation type '{}'", other), self.pos)),
        };
        let name = if self.peek_name().is_some() { Some(self.parse_name()?) } else { None };
        let variables = self.parse_variable_definitions()?;
        self.skip_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(OperationDefinition {
            operation,
            name,
            variables,
            selection_set,
        })
    }

    fn parse_fragment(&mut self) -> Result<FragmentDefinition, ParseError> {
        self.parse_name()?; // "fragment"
        let name = self.parse_name()?;
        if name == "on" {
            return Err(ParseError::new("fragment cannot be named 'on'", self.pos));
        }
        if !self.eat_keyword("on") {
            return Err(ParseError::new("expected 'on'", self.pos));
        }
        let type_condition = self.parse_name()?;
        self.skip_directives()?;
        let selection_set = self.parse_selection_set()?;

        Ok(FragmentDefinition {
            name,
            type_condition,
            selection_set,
        })
    }

    fn parse_document(&mut self) -> Result<Document, ParseError> {
        let mut document = Document::default();

        while !self.at_end() {
            if self.peek_name() == Some("fragment") {
                document.fragments.push(self.parse_fragment()?);
            } else {
                document.operations.push(self.parse_operation()?);
            }
        }

        if document.operations.is_empty() && document.fragments.is_empty() {
            return Err(ParseError::new("empty document", self.pos));
        }

        Ok(document)
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a complete document
pub fn parse_document(input: &str) -> Result<Document, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_document()
}

/// Parse a single selection set, e.g. `{ viewer { id } }`
pub fn parse_selection_set(input: &str) -> Result<SelectionSet, ParseError> {
    let mut parser = Parser::new(input);
    let selection_set = parser.parse_selection_set()?;
    if !parser.at_end() {
        return Err(ParseError::new("unexpected trailing input", parser.pos));
    }
    Ok(selection_set)
}

/// Parse a single argument value, e.g. `{city: $city}`
pub fn parse_value(input: &str) -> Result<ArgumentValue, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse_value()
}
