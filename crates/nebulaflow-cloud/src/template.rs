//! Configuration documents
//!
//! A [`Document`] is the control plane's template: an ordered list of
//! top-level pairs and named vector sections. Section names repeat (one `NIC`
//! section per interface) and so may keys inside a section until they are
//! upserted. The text form is the control plane's template language:
//!
//! ```text
//! NAME = "worker-0"
//! CONTEXT = [
//!   NETWORK = "YES",
//!   SSH_PUBLIC_KEY = "$USER[SSH_PUBLIC_KEY]" ]
//! NIC = [ NETWORK = "private" ]
//! ```

use crate::error::{CloudError, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Name of a network interface section
pub const NIC_SECTION: &str = "NIC";

/// Name of the boot-time context section
pub const CONTEXT_SECTION: &str = "CONTEXT";

/// A single key/value pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A named vector of pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    pairs: Vec<Pair>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pairs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Append a pair, keeping any existing pairs with the same key
    pub fn add_pair(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push(Pair::new(key, value));
    }

    /// Remove every pair stored under `key`, returning how many were removed
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|p| p.key != key);
        before - self.pairs.len()
    }

    /// Delete every pair under `key`, then append one with `value`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove(&key);
        self.pairs.push(Pair::new(key, value));
    }

    /// [`Section::set`] for every entry. Leaves exactly one pair per key
    /// whatever duplicates were present before.
    pub fn upsert<I, K, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }
}

/// Top-level element of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Pair(Pair),
    Section(Section),
}

/// An ordered, duplicate-tolerant template document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    elements: Vec<Element>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the template language
    pub fn parse(input: &str) -> Result<Self> {
        Parser::new(input).parse()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// First top-level value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.elements.iter().find_map(|e| match e {
            Element::Pair(p) if p.key == key => Some(p.value.as_str()),
            _ => None,
        })
    }

    pub fn add_pair(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.elements.push(Element::Pair(Pair::new(key, value)));
    }

    /// Remove every top-level pair stored under `key`
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.elements.len();
        self.elements
            .retain(|e| !matches!(e, Element::Pair(p) if p.key == key));
        before - self.elements.len()
    }

    /// Delete every top-level pair under `key`, then append one with `value`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove(&key);
        self.add_pair(key, value);
    }

    pub fn add_section(&mut self, section: Section) {
        self.elements.push(Element::Section(section));
    }

    /// Move every element of `other` to the end of this document
    pub fn append(&mut self, other: Document) {
        self.elements.extend(other.elements);
    }

    /// All sections named `name`, in document order
    pub fn sections<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Section> {
        self.elements.iter().filter_map(move |e| match e {
            Element::Section(s) if s.name == name => Some(s),
            _ => None,
        })
    }

    fn sections_mut<'a>(&'a mut self, name: &str) -> impl Iterator<Item = &'a mut Section> {
        self.elements.iter_mut().filter_map(move |e| match e {
            Element::Section(s) if s.name == name => Some(s),
            _ => None,
        })
    }

    /// First section named `name`
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections(name).next()
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections_mut(name).next()
    }

    /// First section named `name`, appending an empty one if there is none
    pub fn ensure_section(&mut self, name: &str) -> &mut Section {
        if self.section(name).is_none() {
            self.add_section(Section::new(name));
        }
        let position = self
            .elements
            .iter()
            .position(|e| matches!(e, Element::Section(s) if s.name == name))
            .unwrap_or(self.elements.len() - 1);
        self.section_at(position)
    }

    /// Value of `key` inside the first section named `section`
    pub fn get_from_section(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section).and_then(|s| s.get(key))
    }

    /// NIC sections in document order
    pub fn nics(&self) -> impl Iterator<Item = &Section> {
        self.sections(NIC_SECTION)
    }

    pub fn nic_count(&self) -> usize {
        self.nics().count()
    }

    /// The `index`-th NIC section, if the document has that many
    pub fn locate_nic(&self, index: usize) -> Option<&Section> {
        self.nics().nth(index)
    }

    pub fn locate_nic_mut(&mut self, index: usize) -> Option<&mut Section> {
        self.sections_mut(NIC_SECTION).nth(index)
    }

    /// The `index`-th NIC section, appending empty NIC sections until the
    /// document has `index + 1` of them. NICs before `index` are untouched.
    pub fn ensure_nic(&mut self, index: usize) -> &mut Section {
        let mut positions: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Element::Section(s) if s.name == NIC_SECTION))
            .map(|(i, _)| i)
            .collect();
        while positions.len() <= index {
            self.add_section(Section::new(NIC_SECTION));
            positions.push(self.elements.len() - 1);
        }
        self.section_at(positions[index])
    }

    fn section_at(&mut self, position: usize) -> &mut Section {
        match &mut self.elements[position] {
            Element::Section(s) => s,
            Element::Pair(_) => unreachable!("position {position} does not hold a section"),
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for element in &self.elements {
            match element {
                Element::Pair(p) => writeln!(f, "{} = {}", p.key, quote(&p.value))?,
                Element::Section(s) if s.pairs.is_empty() => writeln!(f, "{} = [ ]", s.name)?,
                Element::Section(s) => {
                    writeln!(f, "{} = [", s.name)?;
                    let last = s.pairs.len() - 1;
                    for (i, p) in s.pairs.iter().enumerate() {
                        let separator = if i == last { " ]" } else { "," };
                        writeln!(f, "  {} = {}{}", p.key, quote(&p.value), separator)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Document {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        Document::parse(s)
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Equals,
    Open,
    Close,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{}'", w),
            Token::Quoted(q) => write!(f, "\"{}\"", q),
            Token::Equals => write!(f, "'='"),
            Token::Open => write!(f, "'['"),
            Token::Close => write!(f, "']'"),
            Token::Comma => write!(f, "','"),
        }
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> CloudError {
        CloudError::InvalidTemplate {
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_blank(&mut self) {
        while let Some(&c) = self.chars.peek() {
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_blank();
        let Some(c) = self.chars.next() else {
            return Ok(None);
        };
        let token = match c {
            '=' => Token::Equals,
            '[' => Token::Open,
            ']' => Token::Close,
            ',' => Token::Comma,
            '"' => Token::Quoted(self.quoted()?),
            c => {
                let mut word = String::from(c);
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || matches!(c, '=' | '[' | ']' | ',' | '"' | '#') {
                        break;
                    }
                    word.push(c);
                    self.chars.next();
                }
                Token::Word(word)
            }
        };
        Ok(Some(token))
    }

    fn quoted(&mut self) -> Result<String> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(value),
                Some('\\') => match self.chars.next() {
                    Some(c @ ('"' | '\\')) => value.push(c),
                    Some(c) => {
                        value.push('\\');
                        value.push(c);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    value.push(c);
                }
            }
        }
    }

    fn expect_equals(&mut self, key: &str) -> Result<()> {
        match self.next_token()? {
            Some(Token::Equals) => Ok(()),
            Some(other) => Err(self.error(format!("expected '=' after {}, found {}", key, other))),
            None => Err(self.error(format!("expected '=' after {}", key))),
        }
    }

    fn parse(mut self) -> Result<Document> {
        let mut doc = Document::new();
        while let Some(token) = self.next_token()? {
            let key = match token {
                Token::Word(key) => key,
                other => return Err(self.error(format!("expected a key, found {}", other))),
            };
            self.expect_equals(&key)?;
            match self.next_token()? {
                Some(Token::Word(value)) | Some(Token::Quoted(value)) => doc.add_pair(key, value),
                Some(Token::Open) => {
                    let section = self.section(key)?;
                    doc.add_section(section);
                }
                Some(other) => {
                    return Err(self.error(format!(
                        "expected a value for {}, found {}",
                        key, other
                    )));
                }
                None => return Err(self.error(format!("missing value for {}", key))),
            }
        }
        Ok(doc)
    }

    fn section(&mut self, name: String) -> Result<Section> {
        let mut section = Section::new(name);
        loop {
            match self.next_token()? {
                Some(Token::Close) => return Ok(section),
                Some(Token::Comma) => continue,
                Some(Token::Word(key)) => {
                    self.expect_equals(&key)?;
                    match self.next_token()? {
                        Some(Token::Word(value)) | Some(Token::Quoted(value)) => {
                            section.add_pair(key, value)
                        }
                        Some(other) => {
                            return Err(self.error(format!(
                                "expected a value for {}, found {}",
                                key, other
                            )));
                        }
                        None => return Err(self.error(format!("missing value for {}", key))),
                    }
                }
                Some(other) => {
                    return Err(self.error(format!(
                        "unexpected {} in vector {}",
                        other, section.name
                    )));
                }
                None => {
                    return Err(self.error(format!("unterminated vector {}", section.name)));
                }
            }
        }
    }
}
