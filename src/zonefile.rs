// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! RFC 1035 master-file parser.
//!
//! Parses the zone text rendered by discoverer templates (and any
//! human-authored zone data) into the in-memory [`Zone`] model. The trailing
//! `;` comment of a record is significant: it carries the provisioner flags.
//!
//! Supported master-file syntax: `$TTL` and `$ORIGIN` directives, `@` and
//! relative owner names, owner inheritance from the previous record,
//! `[ttl]` and `[class]` header fields in either order, and parenthesized
//! continuations for multi-line records (the SOA form). Comments on the
//! interior lines of a parenthesized record annotate fields and are
//! discarded; a record's flag comment is the one on its final physical
//! line.
//!
//! Parsing is all-or-nothing: every bad line is collected and reported in
//! one aggregate error.

use std::fmt;
use std::str::FromStr;

use hickory_proto::rr::{DNSClass, RecordType};

use crate::zone::{Record, RecordFlags, Zone};

/// One offending line in a zone parse.
#[derive(Debug)]
pub struct ParseIssue {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// The set of errors seen while parsing zone data.
#[derive(Debug)]
pub struct ZoneParseError {
    issues: Vec<ParseIssue>,
}

impl ZoneParseError {
    pub fn issues(&self) -> &[ParseIssue] {
        &self.issues
    }
}

impl fmt::Display for ZoneParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} errors while processing zone:", self.issues.len())?;
        let mut first = true;
        for issue in &self.issues {
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ZoneParseError {}

/// Parse master-file text into zone data.
///
/// All errors encountered during parsing are collected into the returned
/// [`ZoneParseError`]; any error fails the whole parse.
pub fn parse_zone_data(input: &str) -> Result<Zone, ZoneParseError> {
    let mut parser = Parser::default();
    parser.run(input);
    if parser.issues.is_empty() {
        Ok(Zone::from(parser.records))
    } else {
        Err(ZoneParseError {
            issues: parser.issues,
        })
    }
}

/// A logical record being assembled across parenthesized continuation
/// lines.
struct Pending {
    text: String,
    start_line: usize,
    leading_ws: bool,
    depth: i32,
}

#[derive(Default)]
struct Parser {
    origin: Option<String>,
    default_ttl: Option<u32>,
    last_owner: Option<String>,
    records: Vec<Record>,
    issues: Vec<ParseIssue>,
}

impl Parser {
    fn run(&mut self, input: &str) {
        let mut pending: Option<Pending> = None;

        for (idx, raw) in input.lines().enumerate() {
            let lineno = idx + 1;
            let (code, comment) = split_comment(raw);
            let (text, delta) = scan_parens(code);

            match pending.as_mut() {
                Some(p) => {
                    p.depth += delta;
                    p.text.push(' ');
                    p.text.push_str(&text);
                    if p.depth <= 0 {
                        let done = pending.take().unwrap();
                        self.finish(done, comment);
                    }
                }
                None => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let item = Pending {
                        text,
                        start_line: lineno,
                        leading_ws: raw.starts_with([' ', '\t']),
                        depth: delta,
                    };
                    if delta > 0 {
                        pending = Some(item);
                    } else if delta < 0 {
                        self.issue(lineno, "unbalanced closing parenthesis");
                    } else {
                        self.finish(item, comment);
                    }
                }
            }
        }

        if let Some(p) = pending {
            self.issue(p.start_line, "unclosed parenthesis");
        }
    }

    fn issue(&mut self, line: usize, message: impl Into<String>) {
        self.issues.push(ParseIssue {
            line,
            message: message.into(),
        });
    }

    fn finish(&mut self, pending: Pending, comment: &str) {
        let line = pending.start_line;
        let tokens: Vec<&str> = pending.text.split_whitespace().collect();
        if tokens.is_empty() {
            self.issue(line, "empty record");
            return;
        }

        if tokens[0].starts_with('$') {
            self.directive(line, &tokens);
            return;
        }

        let (owner, rest) = if pending.leading_ws {
            match self.last_owner.clone() {
                Some(owner) => (owner, &tokens[..]),
                None => {
                    self.issue(line, "record has no owner name");
                    return;
                }
            }
        } else {
            match self.qualify(tokens[0]) {
                Some(owner) => (owner, &tokens[1..]),
                None => {
                    self.issue(
                        line,
                        format!("relative owner name {:?} without $ORIGIN", tokens[0]),
                    );
                    return;
                }
            }
        };

        let mut ttl: Option<u32> = None;
        let mut class: Option<DNSClass> = None;
        let mut rrtype: Option<RecordType> = None;
        let mut rdata_tokens: &[&str] = &[];

        for (i, tok) in rest.iter().enumerate() {
            let upper = tok.to_ascii_uppercase();
            if ttl.is_none() {
                if let Ok(n) = upper.parse::<u32>() {
                    ttl = Some(n);
                    continue;
                }
            }
            if class.is_none() {
                if let Ok(c) = DNSClass::from_str(&upper) {
                    class = Some(c);
                    continue;
                }
            }
            match RecordType::from_str(&upper) {
                Ok(t) => {
                    rrtype = Some(t);
                    rdata_tokens = &rest[i + 1..];
                }
                Err(_) => {
                    self.issue(line, format!("unknown record type {tok:?}"));
                    return;
                }
            }
            break;
        }

        let Some(rrtype) = rrtype else {
            self.issue(line, "missing record type");
            return;
        };
        let Some(ttl) = ttl.or(self.default_ttl) else {
            self.issue(line, "no TTL specified and no $TTL default");
            return;
        };
        if rdata_tokens.is_empty() {
            self.issue(line, "missing rdata");
            return;
        }

        let record = Record::new(
            owner.clone(),
            class.unwrap_or(DNSClass::IN),
            rrtype,
            ttl,
            rdata_tokens.join(" "),
        )
        .with_flags(RecordFlags::parse(comment));

        self.records.push(record);
        self.last_owner = Some(owner);
    }

    fn directive(&mut self, line: usize, tokens: &[&str]) {
        let name = tokens[0].to_ascii_uppercase();
        match name.as_str() {
            "$TTL" => match tokens.get(1).and_then(|t| t.parse::<u32>().ok()) {
                Some(ttl) => self.default_ttl = Some(ttl),
                None => self.issue(line, "$TTL requires a numeric value"),
            },
            "$ORIGIN" => match tokens.get(1) {
                Some(origin) if origin.ends_with('.') => {
                    self.origin = Some((*origin).to_string());
                }
                Some(origin) => {
                    self.issue(line, format!("$ORIGIN {origin:?} is not fully qualified"));
                }
                None => self.issue(line, "$ORIGIN requires a domain name"),
            },
            _ => self.issue(line, format!("unsupported directive {:?}", tokens[0])),
        }
    }

    /// Resolve an owner token to a fully qualified name, or `None` when a
    /// relative name has no origin to hang off.
    fn qualify(&self, token: &str) -> Option<String> {
        if token == "@" {
            return Some(self.origin.clone().unwrap_or_else(|| ".".to_string()));
        }
        if token.ends_with('.') {
            return Some(token.to_string());
        }
        self.origin.as_ref().map(|origin| format!("{token}.{origin}"))
    }
}

/// Split a physical line into its code part and the comment following the
/// first `;` outside quotes. The returned comment excludes the `;`.
fn split_comment(line: &str) -> (&str, &str) {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return (&line[..i], &line[i + 1..]),
            _ => {}
        }
    }
    (line, "")
}

/// Replace parentheses outside quotes with spaces, returning the cleaned
/// text and the nesting delta of the line.
fn scan_parens(code: &str) -> (String, i32) {
    let mut out = String::with_capacity(code.len());
    let mut depth = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for c in code.chars() {
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '(' if !in_quotes => {
                depth += 1;
                out.push(' ');
            }
            ')' if !in_quotes => {
                depth -= 1;
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    (out, depth)
}
