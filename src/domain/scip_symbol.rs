/// SCIP symbol strings.
///
/// A global SCIP symbol is `<scheme> <manager> <package> <version> <descriptors>`,
/// e.g. `rust-analyzer cargo my_crate 0.1.0 server/Handler#run().`.
/// This module turns one into a `SymbolRef` whose display name is a Rust-style
/// path (`my_crate::server::Handler::run`) and whose namespace is the module
/// part (`my_crate::server`). Strings that do not follow the grammar are kept
/// verbatim and treated as `::`-separated paths.

use crate::domain::symbol::{SymbolRef, PATH_SEP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    Namespace,
    Type,
    Term,
    Method,
    TypeParameter,
    Parameter,
    Meta,
    Macro,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub suffix: Suffix,
    pub disambiguator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScipSymbol {
    pub scheme: String,
    pub manager: String,
    pub package: String,
    pub version: String,
    pub descriptors: Vec<Descriptor>,
}

pub fn is_local(symbol: &str) -> bool {
    symbol.starts_with("local ")
}

/// Parse a global symbol. Returns `None` for local symbols and anything
/// that does not follow the grammar.
pub fn parse(symbol: &str) -> Option<ScipSymbol> {
    if is_local(symbol) {
        return None;
    }
    let (fields, rest) = split_header(symbol)?;
    let [scheme, manager, package, version] = fields;
    let descriptors = parse_descriptors(rest)?;
    if descriptors.is_empty() {
        return None;
    }
    Some(ScipSymbol {
        scheme,
        manager,
        package,
        version,
        descriptors,
    })
}

/// Build the `SymbolRef` for a raw SCIP symbol string. The raw string is the key.
pub fn symbol_ref(raw: &str) -> SymbolRef {
    let Some(parsed) = parse(raw) else {
        return SymbolRef::from_path(raw);
    };

    let mut namespace: Vec<&str> = Vec::new();
    if !parsed.package.is_empty() && parsed.package != "." {
        namespace.push(&parsed.package);
    }
    let mut path: Vec<String> = namespace.iter().map(|s| s.to_string()).collect();
    let mut in_namespace = true;

    let mut iter = parsed.descriptors.iter().peekable();
    while let Some(desc) = iter.next() {
        match desc.suffix {
            Suffix::Namespace => {
                if in_namespace {
                    namespace.push(&desc.name);
                }
                path.push(desc.name.clone());
            }
            // rust-analyzer writes impl members as `impl#[SelfType][Trait]member().`
            Suffix::Type if desc.name == "impl" => {
                in_namespace = false;
                let mut self_ty = None;
                while let Some(next) = iter.peek() {
                    if next.suffix != Suffix::TypeParameter {
                        break;
                    }
                    self_ty.get_or_insert(next.name.as_str());
                    iter.next();
                }
                path.push(self_ty.unwrap_or("impl").to_string());
            }
            // Overloads keep their disambiguator: `parse(+1)`
            Suffix::Method => {
                in_namespace = false;
                match desc.disambiguator.as_deref().filter(|d| !d.is_empty()) {
                    Some(d) => path.push(format!("{}({})", desc.name, d)),
                    None => path.push(desc.name.clone()),
                }
            }
            Suffix::Type | Suffix::Term | Suffix::Meta | Suffix::Macro => {
                in_namespace = false;
                path.push(desc.name.clone());
            }
            Suffix::TypeParameter | Suffix::Parameter => {}
        }
    }

    SymbolRef::new(raw, path.join(PATH_SEP), namespace.join(PATH_SEP))
}

/// Member name without an overload disambiguator (`parse` for `parse(+1)`).
pub fn bare_member(member: &str) -> &str {
    member.split_once('(').map_or(member, |(name, _)| name)
}

/// Split off the four space-separated header fields. A doubled space is an
/// escaped literal space.
fn split_header(symbol: &str) -> Option<([String; 4], &str)> {
    let mut fields: Vec<String> = Vec::with_capacity(4);
    let mut current = String::new();
    let mut chars = symbol.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != ' ' {
            current.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, ' '))) {
            chars.next();
            current.push(' ');
            continue;
        }
        fields.push(std::mem::take(&mut current));
        if fields.len() == 4 {
            let header: [String; 4] = fields.try_into().ok()?;
            return Some((header, &symbol[idx + 1..]));
        }
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '+' | '-' | '$')
}

/// Read a simple or backtick-escaped identifier starting at `start`.
fn read_name(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut i = start;
    if chars.get(i) == Some(&'`') {
        i += 1;
        loop {
            match chars.get(i)? {
                '`' if chars.get(i + 1) == Some(&'`') => {
                    name.push('`');
                    i += 2;
                }
                '`' => return Some((name, i + 1)),
                c => {
                    name.push(*c);
                    i += 1;
                }
            }
        }
    }
    while let Some(c) = chars.get(i).copied().filter(|c| is_ident_char(*c)) {
        name.push(c);
        i += 1;
    }
    if name.is_empty() {
        None
    } else {
        Some((name, i))
    }
}

fn parse_descriptors(input: &str) -> Option<Vec<Descriptor>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (name, suffix, disambiguator, next) = match chars[i] {
            '[' => {
                let (name, end) = read_name(&chars, i + 1)?;
                if chars.get(end) != Some(&']') {
                    return None;
                }
                (name, Suffix::TypeParameter, None, end + 1)
            }
            '(' => {
                let (name, end) = read_name(&chars, i + 1)?;
                if chars.get(end) != Some(&')') {
                    return None;
                }
                (name, Suffix::Parameter, None, end + 1)
            }
            _ => {
                let (name, end) = read_name(&chars, i)?;
                match chars.get(end)? {
                    '/' => (name, Suffix::Namespace, None, end + 1),
                    '#' => (name, Suffix::Type, None, end + 1),
                    '.' => (name, Suffix::Term, None, end + 1),
                    ':' => (name, Suffix::Meta, None, end + 1),
                    '!' => (name, Suffix::Macro, None, end + 1),
                    '(' => {
                        let close = chars[end..].iter().position(|c| *c == ')')? + end;
                        if chars.get(close + 1) != Some(&'.') {
                            return None;
                        }
                        let disamb: String = chars[end + 1..close].iter().collect();
                        let disamb = (!disamb.is_empty()).then_some(disamb);
                        (name, Suffix::Method, disamb, close + 2)
                    }
                    _ => return None,
                }
            }
        };
        out.push(Descriptor {
            name,
            suffix,
            disambiguator,
        });
        i = next;
    }

    Some(out)
}
