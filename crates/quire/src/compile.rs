use std::fs;
use std::path::Path;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

use crate::error::{IoContext, QuireError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Script,
    Stylesheet,
}

/// Source-to-source transforms for scripts and stylesheets.
pub trait Compiler: Send + Sync {
    fn minify(&self, source: &str, kind: CodeKind, path: &Path) -> Result<String>;

    /// Minifies a single script entry point standalone and wraps it so it runs
    /// as an immediately-invoked function. No other files are pulled in.
    fn bundle_entry(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCompiler;

impl NativeCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for NativeCompiler {
    fn minify(&self, source: &str, kind: CodeKind, path: &Path) -> Result<String> {
        match kind {
            CodeKind::Script => Ok(minify_script(source)),
            CodeKind::Stylesheet => minify_stylesheet(source, path),
        }
    }

    fn bundle_entry(&self, path: &Path) -> Result<String> {
        let source = fs::read_to_string(path).io_context("reading script", path)?;
        let minified = self.minify(&source, CodeKind::Script, path)?;
        Ok(wrap_iife(&minified))
    }
}

pub fn wrap_iife(body: &str) -> String {
    format!("(()=>{{{body}}})();\n")
}

fn minify_stylesheet(source: &str, path: &Path) -> Result<String> {
    let compile_error = |message: String| QuireError::Compile {
        path: path.to_path_buf(),
        message,
    };

    let mut stylesheet = StyleSheet::parse(
        source,
        ParserOptions {
            filename: path.display().to_string(),
            ..ParserOptions::default()
        },
    )
    .map_err(|error| compile_error(error.to_string()))?;

    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|error| compile_error(error.to_string()))?;

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|error| compile_error(error.to_string()))?;

    Ok(printed.code)
}

pub fn minify_script(source: &str) -> String {
    ScriptMinifier::new(source).run()
}

const REGEX_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "delete",
    "void",
    "throw",
    "new",
    "case",
    "yield",
    "await",
];

const TIGHT_PUNCTUATION: &[char] = &['{', '}', '(', ')', '[', ']', ';', ',', ':', '='];

// After these a line break can never terminate a statement.
const BREAK_FREE_AFTER: &[char] = &['{', '(', '[', ';', ','];
const BREAK_FREE_BEFORE: &[char] = &['}', ')', ']', ';', ','];

/// Strips comments and collapses whitespace, leaving string, template and
/// regex literals untouched. Line breaks that could drive automatic semicolon
/// insertion are kept.
struct ScriptMinifier {
    chars: Vec<char>,
    position: usize,
    output: String,
}

impl ScriptMinifier {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            output: String::with_capacity(source.len()),
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let character = self.peek(0)?;
        self.output.push(character);
        self.position += 1;
        Some(character)
    }

    fn run(mut self) -> String {
        while let Some(character) = self.peek(0) {
            match character {
                '"' | '\'' => self.copy_quoted(character),
                '`' => self.copy_template(),
                '/' if matches!(self.peek(1), Some('/') | Some('*')) => self.skip_trivia(),
                '/' if self.regex_allowed() => self.copy_regex(),
                whitespace if whitespace.is_whitespace() => self.skip_trivia(),
                _ => {
                    self.bump();
                }
            }
        }
        self.output.trim().to_string()
    }

    fn copy_quoted(&mut self, quote: char) {
        self.bump();
        while let Some(character) = self.peek(0) {
            if character == '\\' {
                self.bump();
                self.bump();
                continue;
            }
            self.bump();
            if character == quote || character == '\n' {
                break;
            }
        }
    }

    fn copy_template(&mut self) {
        self.bump();
        while let Some(character) = self.peek(0) {
            match character {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '$' if self.peek(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    self.copy_interpolation();
                }
                '`' => {
                    self.bump();
                    break;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn copy_interpolation(&mut self) {
        let mut depth = 1usize;
        while let Some(character) = self.peek(0) {
            match character {
                '"' | '\'' => self.copy_quoted(character),
                '`' => self.copy_template(),
                '{' => {
                    depth += 1;
                    self.bump();
                }
                '}' => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn copy_regex(&mut self) {
        self.bump();
        while let Some(character) = self.peek(0) {
            match character {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '[' => {
                    self.bump();
                    while let Some(inner) = self.peek(0) {
                        if inner == '\\' {
                            self.bump();
                            self.bump();
                            continue;
                        }
                        self.bump();
                        if inner == ']' {
                            break;
                        }
                    }
                }
                '/' => {
                    self.bump();
                    while self.peek(0).is_some_and(|flag| flag.is_ascii_alphabetic()) {
                        self.bump();
                    }
                    return;
                }
                '\n' => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        let trimmed = self.output.trim_end();
        let Some(previous) = trimmed.chars().last() else {
            return true;
        };
        if matches!(
            previous,
            '=' | '(' | '[' | '!' | '&' | '|' | '?' | '{' | '}' | ';' | ',' | '~' | '^' | ':'
                | '<' | '>' | '+' | '-' | '*' | '%'
        ) {
            return true;
        }
        REGEX_KEYWORDS.iter().any(|keyword| {
            trimmed.strip_suffix(keyword).is_some_and(|before| {
                !before.ends_with(|character: char| {
                    character.is_ascii_alphanumeric() || character == '_' || character == '$'
                })
            })
        })
    }

    /// Consumes a run of whitespace and comments and emits at most one
    /// separator for it.
    fn skip_trivia(&mut self) {
        let mut saw_newline = false;
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some('/'), Some('/')) => {
                    while self.peek(0).is_some_and(|character| character != '\n') {
                        self.position += 1;
                    }
                }
                (Some('/'), Some('*')) => {
                    self.position += 2;
                    while let Some(character) = self.peek(0) {
                        if character == '*' && self.peek(1) == Some('/') {
                            self.position += 2;
                            break;
                        }
                        saw_newline |= character == '\n';
                        self.position += 1;
                    }
                    if self.peek(0).is_none() {
                        break;
                    }
                }
                (Some(character), _) if character.is_whitespace() => {
                    saw_newline |= character == '\n' || character == '\r';
                    self.position += 1;
                }
                _ => break,
            }
        }

        let Some(last) = self.output.chars().last() else {
            return;
        };
        let Some(next) = self.peek(0) else {
            return;
        };

        if saw_newline {
            if !BREAK_FREE_AFTER.contains(&last) && !BREAK_FREE_BEFORE.contains(&next) {
                self.output.push('\n');
            }
        } else if !TIGHT_PUNCTUATION.contains(&last) && !TIGHT_PUNCTUATION.contains(&next) {
            self.output.push(' ');
        }
    }
}
