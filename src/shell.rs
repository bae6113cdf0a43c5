//! A line-oriented command shell over the engine.
//!
//! The shell stands in for the evaluator: it owns one array, a table of
//! buffers and views, and one [`CallSite`] per cached array operation.
//! Each command line produces one line of output; errors are reported as
//! text and never end the session.

use std::cmp::Ordering;
use std::fmt::Write as _;

use thiserror::Error;
use tracing::debug;

use crate::array::{self, ConcatArg};
use crate::buffer::RawBuffer;
use crate::callsite::{ArrayOp, CallSite, CallSiteState};
use crate::config::EngineConfig;
use crate::elements::ElementStore;
use crate::error::EngineError;
use crate::host::{ArrayHost, PrototypeHost};
use crate::typed::{CopySource, DataView, TypedArrayKind, TypedView};
use crate::types::{JsBigInt, JsValue, number_ops, to_number};

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unknown command `{0}` (try `help`)")]
    UnknownCommand(String),
    #[error("no such {kind} `{name}`")]
    UnknownHandle { kind: &'static str, name: String },
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub type ShellResult<T> = Result<T, ShellError>;

const HELP: &str = "\
array:   push v.. | pop | shift | unshift v.. | get i | set i v | delete i
         length [n] | kind | show | concat v.. | slice s [e] | splice s [n [v..]]
         sort [numeric] | reverse | fill v [s [e]] | inherit i v | seal i
buffers: buffer n | view KIND (bufN [offset [len]] | len) | subview vN s [e]
         vget vN i | vset vN i v | vshow vN | vcopy vN offset (vM | [v..])
         dvget bufN KIND offset [le] | dvset bufN KIND offset v [le]
other:   stats | help
values:  numbers, \"strings\", true, false, null, undefined, 12n, [v, ..]";

struct CallSites {
    push: CallSite,
    pop: CallSite,
    concat: CallSite,
    get: CallSite,
    set: CallSite,
    vget: CallSite,
    vset: CallSite,
}

impl CallSites {
    fn new(config: &EngineConfig) -> Self {
        Self {
            push: CallSite::new(ArrayOp::Push, config),
            pop: CallSite::new(ArrayOp::Pop, config),
            concat: CallSite::new(ArrayOp::Concat, config),
            get: CallSite::new(ArrayOp::GetIndex, config),
            set: CallSite::new(ArrayOp::SetIndex, config),
            vget: CallSite::new(ArrayOp::GetIndex, config),
            vset: CallSite::new(ArrayOp::SetIndex, config),
        }
    }

    /// Every site with the command that drives it.
    fn all(&self) -> [(&'static str, &CallSite); 7] {
        [
            ("push", &self.push),
            ("pop", &self.pop),
            ("concat", &self.concat),
            ("get", &self.get),
            ("set", &self.set),
            ("vget", &self.vget),
            ("vset", &self.vset),
        ]
    }
}

pub struct Shell {
    config: EngineConfig,
    array: ElementStore,
    host: PrototypeHost,
    buffers: Vec<RawBuffer>,
    views: Vec<TypedView>,
    sites: CallSites,
}

impl Shell {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            array: ElementStore::new(config),
            host: PrototypeHost::new(),
            buffers: Vec::new(),
            views: Vec::new(),
            sites: CallSites::new(&config),
        }
    }

    pub fn array(&self) -> &ElementStore {
        &self.array
    }

    /// Run every `;`-separated command in `source`, collecting one output
    /// line per command. Errors become `error: ...` lines.
    pub fn run_script(&mut self, source: &str) -> Vec<String> {
        split_statements(source)
            .iter()
            .filter_map(|stmt| match self.eval_line(stmt) {
                Ok(out) if out.is_empty() => None,
                Ok(out) => Some(out),
                Err(e) => Some(format!("error: {e}")),
            })
            .collect()
    }

    /// Evaluate one command and return its printed result.
    pub fn eval_line(&mut self, line: &str) -> ShellResult<String> {
        let tokens = tokenize(line)?;
        let Some((cmd, args)) = tokens.split_first() else {
            return Ok(String::new());
        };
        debug!(command = %cmd, args = args.len(), "shell command");
        match cmd.as_str() {
            "push" => {
                let values = parse_values(args)?;
                let len = self.sites.push.push(&mut self.array, &values, &self.host)?;
                Ok(len.to_string())
            }
            "pop" => Ok(display(&self.sites.pop.pop(&mut self.array, &self.host)?)),
            "shift" => Ok(display(&array::shift(&mut self.array, &self.host)?)),
            "unshift" => {
                let values = parse_values(args)?;
                Ok(array::unshift(&mut self.array, &values, &self.host)?.to_string())
            }
            "get" => {
                let [index] = args else {
                    return Err(ShellError::Usage("get INDEX"));
                };
                let index = parse_index(index)?;
                Ok(self
                    .sites
                    .get
                    .get_index(&self.array, index, &self.host)
                    .map_or_else(|| "undefined".to_string(), |v| display(&v)))
            }
            "set" => {
                let [index, value] = args else {
                    return Err(ShellError::Usage("set INDEX VALUE"));
                };
                let index = parse_index(index)?;
                let value = parse_value(value)?;
                self.sites.set.set_index(&mut self.array, index, value, &self.host)?;
                Ok(String::new())
            }
            "delete" => {
                let [index] = args else {
                    return Err(ShellError::Usage("delete INDEX"));
                };
                let index = parse_index(index)?;
                if self.array.has(index) && !self.host.is_deletable(index) {
                    return Ok("false".to_string());
                }
                self.array.delete(index);
                Ok("true".to_string())
            }
            "length" => match args {
                [] => Ok(self.array.length().to_string()),
                [n] => {
                    let value = parse_value(n)?;
                    self.array.set_length_value(&value, &self.host)?;
                    Ok(self.array.length().to_string())
                }
                _ => Err(ShellError::Usage("length [N]")),
            },
            "kind" => {
                let mut out = self.array.kind().name().to_string();
                if self.array.is_dictionary() {
                    out.push_str(" (dictionary)");
                } else if self.array.is_sparse() {
                    out.push_str(" (holey)");
                }
                Ok(out)
            }
            "show" => Ok(display_store(&self.array)),
            "concat" => self.concat(args),
            "slice" => {
                let (start, end) = parse_range(args, "slice START [END]")?;
                let part = array::slice(&self.array, start, end, &self.host)?;
                Ok(display_store(&part))
            }
            "splice" => {
                let start = args.first().map(|s| parse_number(s)).transpose()?;
                let delete_count = args.get(1).map(|s| parse_number(s)).transpose()?;
                let items = parse_values(args.get(2..).unwrap_or_default())?;
                let removed = array::splice(&mut self.array, start, delete_count, &items, &self.host)?;
                Ok(display_store(&removed))
            }
            "sort" => {
                match args {
                    [] => array::sort_apply(&mut self.array, &self.host, None)?,
                    [mode] if mode == "numeric" => {
                        let mut numeric = |a: &JsValue, b: &JsValue| {
                            to_number(a).partial_cmp(&to_number(b)).unwrap_or(Ordering::Equal)
                        };
                        array::sort_apply(&mut self.array, &self.host, Some(&mut numeric))?
                    }
                    _ => return Err(ShellError::Usage("sort [numeric]")),
                }
                Ok(display_store(&self.array))
            }
            "reverse" => {
                array::reverse(&mut self.array, &self.host)?;
                Ok(display_store(&self.array))
            }
            "fill" => {
                let Some((value, range)) = args.split_first() else {
                    return Err(ShellError::Usage("fill VALUE [START [END]]"));
                };
                let value = parse_value(value)?;
                let start = range.first().map(|s| parse_number(s)).transpose()?.unwrap_or(0.0);
                let end = range.get(1).map(|s| parse_number(s)).transpose()?;
                array::fill(&mut self.array, &value, start, end)?;
                Ok(display_store(&self.array))
            }
            "inherit" => {
                let [index, value] = args else {
                    return Err(ShellError::Usage("inherit INDEX VALUE"));
                };
                let index = parse_index(index)?;
                let value = parse_value(value)?;
                self.host = std::mem::take(&mut self.host).with_inherited(index, value);
                Ok(String::new())
            }
            "seal" => {
                let [index] = args else {
                    return Err(ShellError::Usage("seal INDEX"));
                };
                let index = parse_index(index)?;
                self.host = std::mem::take(&mut self.host).with_sealed(index);
                Ok(String::new())
            }
            "buffer" => {
                let [len] = args else {
                    return Err(ShellError::Usage("buffer BYTE_LENGTH"));
                };
                let len = parse_usize(len)?;
                self.buffers.push(RawBuffer::new(len));
                Ok(format!("buf{}", self.buffers.len() - 1))
            }
            "view" => self.view(args),
            "subview" => {
                let Some((handle, range)) = args.split_first() else {
                    return Err(ShellError::Usage("subview VIEW START [END]"));
                };
                let view = self.view_handle(handle)?.clone();
                let (start, end) = parse_range(range, "subview VIEW START [END]")?;
                self.views.push(view.subview(start, end));
                Ok(format!("v{}", self.views.len() - 1))
            }
            "vget" => {
                let [handle, index] = args else {
                    return Err(ShellError::Usage("vget VIEW INDEX"));
                };
                let index = parse_usize(index)?;
                let view = self.view_handle(handle)?.clone();
                let value = self.sites.vget.get_view_index(&view, index);
                Ok(value.map_or_else(|| "undefined".to_string(), |v| display(&v)))
            }
            "vset" => {
                let [handle, index, value] = args else {
                    return Err(ShellError::Usage("vset VIEW INDEX VALUE"));
                };
                let index = parse_usize(index)?;
                let value = parse_value(value)?;
                let view = self.view_handle(handle)?.clone();
                self.sites.vset.set_view_index(&view, index, &value)?;
                Ok(String::new())
            }
            "vshow" => {
                let [handle] = args else {
                    return Err(ShellError::Usage("vshow VIEW"));
                };
                let view = self.view_handle(handle)?;
                Ok(format!("{} {}", view.kind(), display_list(view.to_vec().iter().map(Some))))
            }
            "vcopy" => {
                let [handle, offset, source] = args else {
                    return Err(ShellError::Usage("vcopy VIEW OFFSET (VIEW | [VALUES])"));
                };
                let offset = parse_usize(offset)?;
                let dest = self.view_handle(handle)?;
                if source.starts_with('[') {
                    let values = parse_list(source)?;
                    dest.bulk_copy(offset, CopySource::Values(&values), 0, values.len())?;
                } else {
                    let src = self.view_handle(source)?;
                    dest.bulk_copy(offset, CopySource::View(src), 0, src.length())?;
                }
                Ok(String::new())
            }
            "dvget" => {
                let (view, kind, offset, rest) = self.data_view(args, "dvget BUFFER KIND OFFSET [le]")?;
                let little_endian = parse_endian(rest)?;
                Ok(display(&view.get(offset, kind, little_endian)?))
            }
            "dvset" => {
                let (view, kind, offset, rest) = self.data_view(args, "dvset BUFFER KIND OFFSET VALUE [le]")?;
                let Some((value, rest)) = rest.split_first() else {
                    return Err(ShellError::Usage("dvset BUFFER KIND OFFSET VALUE [le]"));
                };
                let value = parse_value(value)?;
                view.set(offset, kind, &value, parse_endian(rest)?)?;
                Ok(String::new())
            }
            "stats" => Ok(self.stats()),
            "help" => Ok(HELP.to_string()),
            other => Err(ShellError::UnknownCommand(other.to_string())),
        }
    }

    fn concat(&mut self, args: &[String]) -> ShellResult<String> {
        enum Parsed {
            List(ElementStore),
            Value(JsValue),
        }
        let parsed = args
            .iter()
            .map(|arg| {
                if arg.starts_with('[') {
                    Ok(Parsed::List(ElementStore::from_values(parse_list(arg)?, self.config)?))
                } else {
                    parse_value(arg).map(Parsed::Value)
                }
            })
            .collect::<ShellResult<Vec<_>>>()?;
        let concat_args: Vec<ConcatArg<'_>> = parsed
            .iter()
            .map(|p| match p {
                Parsed::List(store) => ConcatArg::Array(store),
                Parsed::Value(value) => ConcatArg::Value(value),
            })
            .collect();
        let result = self.sites.concat.concat(&self.array, &concat_args, &self.host)?;
        Ok(display_store(&result))
    }

    fn view(&mut self, args: &[String]) -> ShellResult<String> {
        const USAGE: &str = "view KIND (BUFFER [OFFSET [LENGTH]] | LENGTH)";
        let Some((kind, rest)) = args.split_first() else {
            return Err(ShellError::Usage(USAGE));
        };
        let kind = parse_kind(kind)?;
        let view = match rest {
            [len] if !len.starts_with("buf") => TypedView::with_length(kind, parse_usize(len)?)?,
            [buf, more @ ..] if more.len() <= 2 => {
                let buffer = self.buffer_handle(buf)?;
                let offset = more.first().map(|s| parse_usize(s)).transpose()?.unwrap_or(0);
                let length = more.get(1).map(|s| parse_usize(s)).transpose()?;
                TypedView::new(buffer, kind, offset, length)?
            }
            _ => return Err(ShellError::Usage(USAGE)),
        };
        if !self.buffers.iter().any(|b| b.ptr_eq(view.buffer())) {
            self.buffers.push(view.buffer().clone());
        }
        self.views.push(view);
        Ok(format!("v{}", self.views.len() - 1))
    }

    fn data_view<'a>(
        &self,
        args: &'a [String],
        usage: &'static str,
    ) -> ShellResult<(DataView, TypedArrayKind, usize, &'a [String])> {
        let [buf, kind, offset, rest @ ..] = args else {
            return Err(ShellError::Usage(usage));
        };
        let view = DataView::new(self.buffer_handle(buf)?, 0, None)?;
        Ok((view, parse_kind(kind)?, parse_usize(offset)?, rest))
    }

    fn buffer_handle(&self, name: &str) -> ShellResult<&RawBuffer> {
        name.strip_prefix("buf")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| self.buffers.get(n))
            .ok_or_else(|| ShellError::UnknownHandle {
                kind: "buffer",
                name: name.to_string(),
            })
    }

    fn view_handle(&self, name: &str) -> ShellResult<&TypedView> {
        name.strip_prefix('v')
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| self.views.get(n))
            .ok_or_else(|| ShellError::UnknownHandle {
                kind: "view",
                name: name.to_string(),
            })
    }

    fn stats(&self) -> String {
        let mut out = String::new();
        for (command, site) in self.sites.all() {
            let stats = site.stats();
            let state = match site.state() {
                CallSiteState::Uninitialized => "uninitialized".to_string(),
                CallSiteState::Monomorphic(guard) => format!("monomorphic({})", guard.shape),
                CallSiteState::Megamorphic => "megamorphic".to_string(),
            };
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(
                out,
                "{:<6} {:<32} hits={} misses={} relinks={}",
                command,
                state,
                stats.hits,
                stats.misses,
                stats.relinks
            );
        }
        out
    }
}

/// Split on `;` outside quotes and brackets.
pub fn split_statements(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote = None;
    let mut depth = 0usize;
    for c in source.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ';' | '\n') if depth == 0 => {
                out.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    out.push(current);
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .collect()
}

/// Split a command line into words. Quoted strings and bracketed lists
/// stay single tokens, delimiters included.
fn tokenize(line: &str) -> ShellResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' || c == '\'' {
            token.push(c);
            chars.next();
            loop {
                match chars.next() {
                    Some(ch) if ch == c => break,
                    Some(ch) => token.push(ch),
                    None => return Err(ShellError::Parse(format!("unterminated string in `{line}`"))),
                }
            }
            token.push(c);
        } else if c == '[' {
            let mut depth = 0usize;
            let mut quote = None;
            for ch in chars.by_ref() {
                token.push(ch);
                match (quote, ch) {
                    (Some(q), ch) if ch == q => quote = None,
                    (Some(_), _) => {}
                    (None, '"' | '\'') => quote = Some(ch),
                    (None, '[') => depth += 1,
                    (None, ']') => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if depth != 0 {
                return Err(ShellError::Parse(format!("unterminated list in `{line}`")));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }
    Ok(tokens)
}

fn parse_values(tokens: &[String]) -> ShellResult<Vec<JsValue>> {
    tokens.iter().map(|t| parse_value(t)).collect()
}

/// Elements of a `[a, b, ...]` token.
fn parse_list(token: &str) -> ShellResult<Vec<JsValue>> {
    let inner = token
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| ShellError::Parse(format!("expected a list, got `{token}`")))?;
    let spaced = inner.replace(',', " ");
    let items = tokenize(&spaced)?;
    if items.iter().any(|t| t.starts_with('[')) {
        return Err(ShellError::Parse("nested lists are not supported".to_string()));
    }
    parse_values(&items)
}

pub fn parse_value(token: &str) -> ShellResult<JsValue> {
    match token {
        "undefined" => return Ok(JsValue::Undefined),
        "null" => return Ok(JsValue::Null),
        "true" => return Ok(JsValue::Boolean(true)),
        "false" => return Ok(JsValue::Boolean(false)),
        "NaN" => return Ok(JsValue::Number(f64::NAN)),
        _ => {}
    }
    for q in ['"', '\''] {
        if let Some(s) = token.strip_prefix(q).and_then(|t| t.strip_suffix(q)) {
            return Ok(JsValue::string(s));
        }
    }
    if let Some(digits) = token.strip_suffix('n')
        && !digits.is_empty()
        && let Ok(value) = digits.parse::<num_bigint::BigInt>()
    {
        return Ok(JsValue::BigInt(JsBigInt { value }));
    }
    parse_number(token).map(JsValue::Number)
}

fn parse_number(token: &str) -> ShellResult<f64> {
    let n = to_number(&JsValue::string(token));
    if (n.is_nan() && token != "NaN") || token.trim().is_empty() {
        return Err(ShellError::Parse(format!("not a value: `{token}`")));
    }
    Ok(n)
}

fn parse_index(token: &str) -> ShellResult<u32> {
    token
        .parse::<u32>()
        .map_err(|_| ShellError::Parse(format!("not an array index: `{token}`")))
}

fn parse_usize(token: &str) -> ShellResult<usize> {
    token
        .parse::<usize>()
        .map_err(|_| ShellError::Parse(format!("not a non-negative integer: `{token}`")))
}

fn parse_kind(token: &str) -> ShellResult<TypedArrayKind> {
    TypedArrayKind::from_name(token).ok_or_else(|| ShellError::Parse(format!("unknown element type `{token}`")))
}

fn parse_range(args: &[String], usage: &'static str) -> ShellResult<(f64, Option<f64>)> {
    match args {
        [start] => Ok((parse_number(start)?, None)),
        [start, end] => Ok((parse_number(start)?, Some(parse_number(end)?))),
        _ => Err(ShellError::Usage(usage)),
    }
}

fn parse_endian(rest: &[String]) -> ShellResult<bool> {
    match rest {
        [] => Ok(false),
        [e] if e == "le" => Ok(true),
        [e] if e == "be" => Ok(false),
        _ => Err(ShellError::Parse("expected `le` or `be`".to_string())),
    }
}

/// Value as the shell prints it: strings quoted, BigInts suffixed.
pub fn display(value: &JsValue) -> String {
    match value {
        JsValue::String(s) => format!("{:?}", s.to_rust_string()),
        JsValue::BigInt(b) => format!("{}n", b.value),
        JsValue::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
        JsValue::Number(n) => number_ops::to_string(*n),
        other => other.to_string(),
    }
}

fn display_list<'a>(items: impl Iterator<Item = Option<&'a JsValue>>) -> String {
    let parts: Vec<String> = items
        .map(|item| item.map_or_else(|| "<hole>".to_string(), display))
        .collect();
    format!("[{}]", parts.join(", "))
}

fn display_store(store: &ElementStore) -> String {
    const LIMIT: u32 = 64;
    if store.length() > LIMIT {
        let shown: Vec<String> = store
            .present()
            .take(LIMIT as usize)
            .map(|(i, v)| format!("{i}: {}", display(&v)))
            .collect();
        return format!("length {} {{{}}}", store.length(), shown.join(", "));
    }
    let items = store.to_vec();
    display_list(items.iter().map(Option::as_ref))
}
