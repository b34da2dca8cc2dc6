//! Miniature GLSL front end.
//!
//! Just enough of a compiler to behave like a driver towards the shading
//! pipeline:
//!
//! - comments, line continuations and `#line` tracking
//! - `#define`/`#undef`, the full `#if`/`#ifdef`/`#elif`/`#else`/`#endif`
//!   family with constant expressions, and `#error`
//! - object-like macro expansion in code
//! - `struct` and `uniform` declarations (blocks are skipped), brace balance,
//!   the presence of `main`, and the set of referenced identifiers, which is
//!   what decides whether a uniform stays active
//!
//! Diagnostics use the `ERROR: <file>:<line>: '<token>' : <message>` shape.

use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::uniforms::UniformType;

const MAX_EXPANSION_DEPTH: usize = 32;

/// One declared variable: `ty name[array_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Declarator {
    pub name: String,
    pub ty: String,
    pub array_len: Option<u32>,
}

/// Everything the linker needs from one compiled stage.
#[derive(Debug, Default)]
pub(super) struct StageAnalysis {
    pub uniforms: Vec<Declarator>,
    pub structs: FxHashMap<String, Vec<Declarator>>,
    pub referenced: FxHashSet<String>,
    pub has_main: bool,
}

/// Compiles one stage. On failure returns the info log.
pub(super) fn analyze(source: &str) -> Result<StageAnalysis, String> {
    let mut frontend = Frontend::default();
    frontend.preprocess(source);

    if frontend.errors == 0 {
        let parser = DeclParser {
            toks: &frontend.tokens,
            pos: 0,
            out: StageAnalysis::default(),
        };
        match parser.run() {
            Ok(analysis) => return Ok(analysis),
            Err(diag) => {
                frontend.line = diag.line;
                frontend.file = diag.file;
                frontend.error(&diag.token, &diag.message);
            }
        }
    }

    let _ = writeln!(
        frontend.log,
        "ERROR: {} compilation errors.  No code generated.",
        frontend.errors
    );
    Err(frontend.log)
}

// ─── Lexing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: u32,
    file: u32,
}

fn lex(text: &str) -> Vec<Tok> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || (c == '.' && chars.peek().is_some_and(|&(_, n)| n.is_ascii_digit()));

        if c.is_ascii_alphabetic() || c == '_' || starts_number {
            let mut end = start + c.len_utf8();
            while let Some(&(i, n)) = chars.peek() {
                let continues = n.is_ascii_alphanumeric() || n == '_' || (starts_number && n == '.');
                if !continues {
                    break;
                }
                end = i + n.len_utf8();
                chars.next();
            }
            let word = text[start..end].to_string();
            out.push(if starts_number {
                Tok::Number(word)
            } else {
                Tok::Ident(word)
            });
        } else {
            out.push(Tok::Punct(c));
        }
    }

    out
}

/// Replaces comments with a space, keeping their line breaks.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
                out.push(' ');
            }
            ('/', Some('*')) => {
                chars.next();
                out.push(' ');
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    if n == '\n' {
                        out.push('\n');
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn parse_int(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U']);
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

fn leading_ident(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

// ─── Preprocessing ────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Macro {
    Object(String),
    Function,
}

#[derive(Debug)]
struct Conditional {
    active: bool,
    parent_active: bool,
    taken: bool,
    seen_else: bool,
}

#[derive(Debug, Default)]
struct Frontend {
    macros: FxHashMap<String, Macro>,
    conditionals: Vec<Conditional>,
    tokens: Vec<Token>,
    log: String,
    errors: usize,
    line: u32,
    file: u32,
}

impl Frontend {
    fn error(&mut self, token: &str, message: &str) {
        let _ = writeln!(
            self.log,
            "ERROR: {}:{}: '{token}' : {message}",
            self.file, self.line
        );
        self.errors += 1;
    }

    fn active(&self) -> bool {
        self.conditionals.last().is_none_or(|c| c.active)
    }

    fn preprocess(&mut self, source: &str) {
        let text = strip_comments(&source.replace("\r\n", "\n").replace('\r', "\n"));
        let mut lines = text.split('\n');
        let mut next_line = 1u32;

        while let Some(first) = lines.next() {
            self.line = next_line;
            next_line += 1;

            let mut logical = first.to_string();
            while logical.ends_with('\\') {
                logical.pop();
                match lines.next() {
                    Some(next) => {
                        logical.push_str(next);
                        next_line += 1;
                    }
                    None => break,
                }
            }

            if let Some(body) = logical.trim_start().strip_prefix('#') {
                if let Some(line) = self.directive(body) {
                    next_line = line;
                }
            } else if self.active() {
                self.push_code(&logical);
            }
        }

        if !self.conditionals.is_empty() {
            self.error("", "unexpected end of file, missing #endif");
        }
    }

    /// Handles one directive; returns the new line number for `#line`.
    fn directive(&mut self, body: &str) -> Option<u32> {
        let body = body.trim_start();
        let name = leading_ident(body);
        let args = body[name.len()..].trim();

        match name {
            "ifdef" | "ifndef" => {
                let macro_name = leading_ident(args);
                if macro_name.is_empty() {
                    self.error(&format!("#{name}"), "missing macro name");
                }
                let parent = self.active();
                let defined = self.macros.contains_key(macro_name);
                let cond = parent && (defined == (name == "ifdef"));
                self.conditionals.push(Conditional {
                    active: cond,
                    parent_active: parent,
                    taken: cond,
                    seen_else: false,
                });
            }
            "if" => {
                let parent = self.active();
                let cond = parent && self.evaluate("#if", args);
                self.conditionals.push(Conditional {
                    active: cond,
                    parent_active: parent,
                    taken: cond,
                    seen_else: false,
                });
            }
            "elif" => {
                let state = self
                    .conditionals
                    .last()
                    .map(|top| (top.seen_else, top.parent_active && !top.taken));
                match state {
                    None => self.error("#elif", "#elif without #if"),
                    Some((true, _)) => self.error("#elif", "#elif after #else"),
                    Some((false, open)) => {
                        let cond = open && self.evaluate("#elif", args);
                        if let Some(top) = self.conditionals.last_mut() {
                            top.active = cond;
                            top.taken |= cond;
                        }
                    }
                }
            }
            "else" => {
                let seen_else = self.conditionals.last().map(|top| top.seen_else);
                match seen_else {
                    None => self.error("#else", "#else without #if"),
                    Some(true) => self.error("#else", "#else after #else"),
                    Some(false) => {
                        if let Some(top) = self.conditionals.last_mut() {
                            top.active = top.parent_active && !top.taken;
                            top.taken = true;
                            top.seen_else = true;
                        }
                    }
                }
            }
            "endif" => {
                if self.conditionals.pop().is_none() {
                    self.error("#endif", "#endif without #if");
                }
            }
            _ if !self.active() => {}
            "" | "version" | "extension" | "pragma" => {}
            "define" => self.define(args),
            "undef" => {
                self.macros.remove(leading_ident(args));
            }
            "line" => return self.line_directive(args),
            "error" => self.error("#error", args),
            other => self.error(&format!("#{other}"), "invalid directive"),
        }

        None
    }

    fn define(&mut self, args: &str) {
        let name = leading_ident(args);
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            self.error("#define", "missing macro name");
            return;
        }
        let rest = &args[name.len()..];
        let definition = if rest.starts_with('(') {
            Macro::Function
        } else {
            Macro::Object(rest.trim().to_string())
        };
        self.macros.insert(name.to_string(), definition);
    }

    fn line_directive(&mut self, args: &str) -> Option<u32> {
        let mut words = args.split_whitespace();
        let line = words.next().and_then(|w| w.parse::<u32>().ok());
        let file = words.next().map(str::parse::<u32>);

        match (line, file) {
            (Some(line), None) => Some(line),
            (Some(line), Some(Ok(file))) => {
                self.file = file;
                Some(line)
            }
            _ => {
                self.error("#line", "invalid line directive");
                None
            }
        }
    }

    fn evaluate(&mut self, token: &str, args: &str) -> bool {
        let toks = lex(args);
        let mut parser = ExprParser {
            toks: &toks,
            pos: 0,
            macros: &self.macros,
            depth: 0,
        };
        let result = parser.expression().and_then(|v| {
            if parser.pos == toks.len() {
                Ok(v)
            } else {
                Err("unexpected tokens following expression".to_string())
            }
        });

        match result {
            Ok(v) => v != 0,
            Err(message) => {
                self.error(token, &message);
                false
            }
        }
    }

    fn push_code(&mut self, text: &str) {
        let mut expanded = Vec::new();
        self.expand(lex(text), &mut expanded, 0);
        let (line, file) = (self.line, self.file);
        self.tokens.extend(
            expanded
                .into_iter()
                .map(|tok| Token { tok, line, file }),
        );
    }

    fn expand(&self, toks: Vec<Tok>, out: &mut Vec<Tok>, depth: usize) {
        for tok in toks {
            if let Tok::Ident(name) = &tok
                && depth < MAX_EXPANSION_DEPTH
                && let Some(Macro::Object(body)) = self.macros.get(name)
            {
                self.expand(lex(body), out, depth + 1);
                continue;
            }
            out.push(tok);
        }
    }
}

// ─── #if expressions ──────────────────────────────────────────────────────────

struct ExprParser<'a> {
    toks: &'a [Tok],
    pos: usize,
    macros: &'a FxHashMap<String, Macro>,
    depth: usize,
}

type ExprResult = Result<i64, String>;

impl ExprParser<'_> {
    fn punct(&self, offset: usize) -> Option<char> {
        match self.toks.get(self.pos + offset) {
            Some(Tok::Punct(c)) => Some(*c),
            _ => None,
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.punct(0) == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_pair(&mut self, a: char, b: char) -> bool {
        if self.punct(0) == Some(a) && self.punct(1) == Some(b) {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> ExprResult {
        let mut value = self.logical_and()?;
        while self.eat_pair('|', '|') {
            let rhs = self.logical_and()?;
            value = i64::from(value != 0 || rhs != 0);
        }
        Ok(value)
    }

    fn logical_and(&mut self) -> ExprResult {
        let mut value = self.equality()?;
        while self.eat_pair('&', '&') {
            let rhs = self.equality()?;
            value = i64::from(value != 0 && rhs != 0);
        }
        Ok(value)
    }

    fn equality(&mut self) -> ExprResult {
        let mut value = self.relational()?;
        loop {
            if self.eat_pair('=', '=') {
                value = i64::from(value == self.relational()?);
            } else if self.eat_pair('!', '=') {
                value = i64::from(value != self.relational()?);
            } else {
                return Ok(value);
            }
        }
    }

    fn relational(&mut self) -> ExprResult {
        let mut value = self.additive()?;
        loop {
            if self.eat_pair('<', '=') {
                value = i64::from(value <= self.additive()?);
            } else if self.eat_pair('>', '=') {
                value = i64::from(value >= self.additive()?);
            } else if self.eat('<') {
                value = i64::from(value < self.additive()?);
            } else if self.eat('>') {
                value = i64::from(value > self.additive()?);
            } else {
                return Ok(value);
            }
        }
    }

    fn additive(&mut self) -> ExprResult {
        let mut value = self.multiplicative()?;
        loop {
            if self.eat('+') {
                value = value.wrapping_add(self.multiplicative()?);
            } else if self.eat('-') {
                value = value.wrapping_sub(self.multiplicative()?);
            } else {
                return Ok(value);
            }
        }
    }

    fn multiplicative(&mut self) -> ExprResult {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value = value.wrapping_mul(self.unary()?);
            } else if self.eat('/') || self.eat('%') {
                let is_div = matches!(self.toks.get(self.pos - 1), Some(Tok::Punct('/')));
                let rhs = self.unary()?;
                if rhs == 0 {
                    return Err("division by zero in preprocessor expression".to_string());
                }
                value = if is_div {
                    value.wrapping_div(rhs)
                } else {
                    value.wrapping_rem(rhs)
                };
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> ExprResult {
        if self.punct(0) == Some('!') && self.punct(1) != Some('=') {
            self.pos += 1;
            return Ok(i64::from(self.unary()? == 0));
        }
        if self.eat('-') {
            return Ok(self.unary()?.wrapping_neg());
        }
        if self.eat('+') {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> ExprResult {
        let Some(tok) = self.toks.get(self.pos) else {
            return Err("unexpected end of preprocessor expression".to_string());
        };
        self.pos += 1;

        match tok {
            Tok::Number(text) => {
                parse_int(text).ok_or_else(|| format!("invalid integer constant '{text}'"))
            }
            Tok::Ident(word) if word == "defined" => {
                let paren = self.eat('(');
                let Some(Tok::Ident(name)) = self.toks.get(self.pos) else {
                    return Err("expected macro name after 'defined'".to_string());
                };
                self.pos += 1;
                if paren && !self.eat(')') {
                    return Err("missing ')' after 'defined'".to_string());
                }
                Ok(i64::from(self.macros.contains_key(name)))
            }
            Tok::Ident(name) => match self.macros.get(name) {
                Some(Macro::Object(body)) => {
                    if self.depth >= MAX_EXPANSION_DEPTH {
                        return Err(format!("macro '{name}' expands too deeply"));
                    }
                    let toks = lex(body);
                    if toks.is_empty() {
                        return Ok(0);
                    }
                    let mut nested = ExprParser {
                        toks: &toks,
                        pos: 0,
                        macros: self.macros,
                        depth: self.depth + 1,
                    };
                    let value = nested.expression()?;
                    if nested.pos != toks.len() {
                        return Err(format!("macro '{name}' is not a constant expression"));
                    }
                    Ok(value)
                }
                _ => Ok(0),
            },
            Tok::Punct('(') => {
                let value = self.expression()?;
                if self.eat(')') {
                    Ok(value)
                } else {
                    Err("missing ')' in preprocessor expression".to_string())
                }
            }
            Tok::Punct(c) => Err(format!("unexpected '{c}' in preprocessor expression")),
        }
    }
}

// ─── Declarations ─────────────────────────────────────────────────────────────

struct Diagnostic {
    line: u32,
    file: u32,
    token: String,
    message: String,
}

type ParseResult<T> = Result<T, Diagnostic>;

struct DeclParser<'a> {
    toks: &'a [Token],
    pos: usize,
    out: StageAnalysis,
}

const PRECISIONS: [&str; 3] = ["lowp", "mediump", "highp"];

impl DeclParser<'_> {
    fn run(mut self) -> ParseResult<StageAnalysis> {
        let toks = self.toks;
        let mut depth = 0usize;

        while let Some(token) = toks.get(self.pos) {
            match &token.tok {
                Tok::Punct('{') => depth += 1,
                Tok::Punct('}') => {
                    if depth == 0 {
                        return Err(self.diag_at(token, "syntax error, unexpected '}'"));
                    }
                    depth -= 1;
                }
                Tok::Ident(word) if depth == 0 && word == "struct" => {
                    self.struct_decl()?;
                    continue;
                }
                Tok::Ident(word) if depth == 0 && word == "uniform" => {
                    self.uniform_decl()?;
                    continue;
                }
                Tok::Ident(word) if word == "layout" => {
                    self.pos += 1;
                    self.skip_group('(', ')')?;
                    continue;
                }
                Tok::Ident(word) => {
                    if depth == 0 && word == "main" && self.punct_at(self.pos + 1) == Some('(') {
                        self.out.has_main = true;
                    }
                    self.out.referenced.insert(word.clone());
                }
                _ => {}
            }
            self.pos += 1;
        }

        if depth != 0 {
            return Err(self.diag_eof("unexpected end of file, unbalanced braces"));
        }
        Ok(self.out)
    }

    fn diag_at(&self, token: &Token, message: &str) -> Diagnostic {
        let text = match &token.tok {
            Tok::Ident(s) | Tok::Number(s) => s.clone(),
            Tok::Punct(c) => c.to_string(),
        };
        Diagnostic {
            line: token.line,
            file: token.file,
            token: text,
            message: message.to_string(),
        }
    }

    fn diag_eof(&self, message: &str) -> Diagnostic {
        let (line, file) = self.toks.last().map_or((0, 0), |t| (t.line, t.file));
        Diagnostic {
            line,
            file,
            token: String::new(),
            message: message.to_string(),
        }
    }

    fn diag(&self, message: &str) -> Diagnostic {
        match self.toks.get(self.pos) {
            Some(token) => self.diag_at(token, message),
            None => self.diag_eof(message),
        }
    }

    fn punct_at(&self, pos: usize) -> Option<char> {
        match self.toks.get(pos).map(|t| &t.tok) {
            Some(Tok::Punct(c)) => Some(*c),
            _ => None,
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.punct_at(self.pos) == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.diag(&format!("syntax error, expected '{c}'")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<String> {
        match self.toks.get(self.pos).map(|t| &t.tok) {
            Some(Tok::Ident(word)) => {
                self.pos += 1;
                Ok(word.clone())
            }
            _ => Err(self.diag(&format!("syntax error, expected {what}"))),
        }
    }

    fn skip_precision(&mut self) {
        while let Some(Tok::Ident(word)) = self.toks.get(self.pos).map(|t| &t.tok) {
            if !PRECISIONS.contains(&word.as_str()) {
                break;
            }
            self.pos += 1;
        }
    }

    /// Skips a balanced `open ... close` group starting at the cursor.
    fn skip_group(&mut self, open: char, close: char) -> ParseResult<()> {
        self.expect_punct(open)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.punct_at(self.pos) {
                _ if self.pos >= self.toks.len() => {
                    return Err(self.diag_eof(&format!("unexpected end of file, missing '{close}'")));
                }
                Some(c) if c == open => depth += 1,
                Some(c) if c == close => depth -= 1,
                _ => {}
            }
            self.pos += 1;
        }
        Ok(())
    }

    fn skip_past(&mut self, c: char) -> ParseResult<()> {
        while self.pos < self.toks.len() {
            self.pos += 1;
            if self.punct_at(self.pos - 1) == Some(c) {
                return Ok(());
            }
        }
        Err(self.diag_eof(&format!("unexpected end of file, expected '{c}'")))
    }

    fn array_len(&mut self) -> ParseResult<u32> {
        let len = match self.toks.get(self.pos).map(|t| &t.tok) {
            Some(Tok::Number(text)) => parse_int(text).and_then(|n| u32::try_from(n).ok()),
            _ => None,
        };
        match len {
            Some(0) => Err(self.diag("array size must be greater than zero")),
            Some(n) => {
                self.pos += 1;
                Ok(n)
            }
            None => Err(self.diag("array size must be a constant integer expression")),
        }
    }

    /// `[precision] type name[N] [= init], name2 ... ;`
    fn declaration(&mut self) -> ParseResult<Vec<Declarator>> {
        self.skip_precision();
        let ty = self.expect_ident("type name")?;
        let mut decls = Vec::new();

        loop {
            let name = self.expect_ident("identifier")?;
            let array_len = if self.eat_punct('[') {
                let len = self.array_len()?;
                self.expect_punct(']')?;
                Some(len)
            } else {
                None
            };
            decls.push(Declarator {
                name,
                ty: ty.clone(),
                array_len,
            });

            if self.eat_punct('=') {
                self.skip_initializer()?;
            }
            if self.eat_punct(',') {
                continue;
            }
            self.expect_punct(';')?;
            return Ok(decls);
        }
    }

    fn skip_initializer(&mut self) -> ParseResult<()> {
        let mut depth = 0usize;
        while let Some(c) = self.toks.get(self.pos).map(|t| &t.tok) {
            match c {
                Tok::Punct('(' | '[' | '{') => depth += 1,
                Tok::Punct(')' | ']' | '}') => depth = depth.saturating_sub(1),
                Tok::Punct(',' | ';') if depth == 0 => return Ok(()),
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.diag_eof("unexpected end of file in initializer"))
    }

    fn check_type(&self, decl: &Declarator, at: usize) -> ParseResult<()> {
        if UniformType::from_glsl(&decl.ty).is_some() || self.out.structs.contains_key(&decl.ty) {
            return Ok(());
        }
        let token = &self.toks[at.min(self.toks.len() - 1)];
        let mut diag = self.diag_at(token, "undeclared type");
        diag.token.clone_from(&decl.ty);
        Err(diag)
    }

    fn struct_decl(&mut self) -> ParseResult<()> {
        let start = self.pos;
        self.pos += 1;
        let name = self.expect_ident("struct name")?;
        self.expect_punct('{')?;

        let mut fields: Vec<Declarator> = Vec::new();
        while !self.eat_punct('}') {
            if self.pos >= self.toks.len() {
                return Err(self.diag_eof("unexpected end of file in struct"));
            }
            let field_start = self.pos;
            for field in self.declaration()? {
                self.check_type(&field, field_start)?;
                if fields.iter().any(|f| f.name == field.name) {
                    let mut diag = self.diag_at(&self.toks[field_start], "redefinition");
                    diag.token = field.name;
                    return Err(diag);
                }
                fields.push(field);
            }
        }
        if fields.is_empty() {
            return Err(self.diag_at(&self.toks[start], "struct must have at least one member"));
        }
        self.skip_past(';')?;

        if self.out.structs.contains_key(&name) {
            let mut diag = self.diag_at(&self.toks[start], "redefinition");
            diag.token = name;
            return Err(diag);
        }
        self.out.structs.insert(name, fields);
        Ok(())
    }

    fn uniform_decl(&mut self) -> ParseResult<()> {
        self.pos += 1;
        self.skip_precision();

        // Uniform blocks are backed by buffers and carry no locations.
        if self.punct_at(self.pos + 1) == Some('{') {
            self.pos += 1;
            self.skip_group('{', '}')?;
            return self.skip_past(';');
        }

        let start = self.pos;
        for decl in self.declaration()? {
            self.check_type(&decl, start)?;
            if self.out.uniforms.iter().any(|u| u.name == decl.name) {
                let mut diag = self.diag_at(&self.toks[start], "redefinition");
                diag.token = decl.name;
                return Err(diag);
            }
            self.out.uniforms.push(decl);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_uniforms_and_references() {
        let analysis = analyze(
            "uniform float u_Scale;\n\
             uniform highp vec3 u_Color;\n\
             void main() { gl_FragColor = vec4(u_Color, 1.0); }\n",
        )
        .unwrap();

        assert!(analysis.has_main);
        assert_eq!(analysis.uniforms.len(), 2);
        assert!(analysis.referenced.contains("u_Color"));
        assert!(!analysis.referenced.contains("u_Scale"));
    }

    #[test]
    fn conditionals_select_code() {
        let analysis = analyze(
            "#define MODE 2\n\
             #if MODE == 1\n\
             uniform float a;\n\
             #elif defined(MODE) && MODE > 1\n\
             uniform float b;\n\
             #else\n\
             uniform float c;\n\
             #endif\n\
             void main() {}\n",
        )
        .unwrap();

        let names: Vec<_> = analysis.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["b"]);
    }

    #[test]
    fn macros_expand_in_array_sizes() {
        let analysis = analyze(
            "#define COUNT 4\n\
             uniform vec4 u_Values[COUNT];\n\
             void main() { u_Values[0]; }\n",
        )
        .unwrap();
        assert_eq!(analysis.uniforms[0].array_len, Some(4));
    }

    #[test]
    fn error_directive_reports_line_and_file() {
        let log = analyze("void main() {}\n#line 7 3\n\n#error boom\n").unwrap_err();
        assert!(log.contains("ERROR: 3:8: '#error' : boom"), "{log}");
    }

    #[test]
    fn comments_and_continuations_keep_line_numbers() {
        let log = analyze("/* a\n b */\n#define X \\\n 1\n#error here\n").unwrap_err();
        assert!(log.contains("0:5: '#error'"), "{log}");
    }

    #[test]
    fn unbalanced_braces_fail() {
        assert!(analyze("void main() {\n").is_err());
        assert!(analyze("#if 1\nvoid main() {}\n").is_err());
    }

    #[test]
    fn struct_fields_must_be_known_types() {
        let log = analyze("struct A { Missing m; };\nvoid main() {}\n").unwrap_err();
        assert!(log.contains("'Missing' : undeclared type"), "{log}");
    }

    #[test]
    fn uniform_blocks_are_skipped() {
        let analysis = analyze(
            "layout(std140) uniform Camera { mat4 view; } camera;\n\
             uniform float u_Time;\n\
             void main() { u_Time; }\n",
        )
        .unwrap();
        assert_eq!(analysis.uniforms.len(), 1);
        assert_eq!(analysis.uniforms[0].name, "u_Time");
    }
}
