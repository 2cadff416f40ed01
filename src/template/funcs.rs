//! General-purpose template functions
//!
//! Helpers that take a subject string accept it as the last argument, so
//! `rmprefix(".", name)` reads like the call it replaces. The single-argument
//! string helpers are registered as filters as well.

use crate::case;
use crate::descriptor::node::option_value;
use crate::descriptor::{DescriptorSet, FlatIndex, Node};
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Target of the `log`/`logln`/`logf` helpers
pub const LOG_TARGET: &str = "protoc_gen_stencil::template";

/// Compiled expressions of `gsubr`/`gsubl`, keyed by source
///
/// One cache per engine; nothing outlives the run.
#[derive(Debug, Default)]
struct RegexCache(Mutex<HashMap<String, Regex>>);

impl RegexCache {
    fn compile(&self, source: &str) -> Result<Regex, Error> {
        let mut cache = self
            .0
            .lock()
            .map_err(|_| invalid("regex cache poisoned"))?;
        if let Some(rx) = cache.get(source) {
            return Ok(rx.clone());
        }
        let rx = Regex::new(source)
            .map_err(|e| invalid(format!("invalid regex {:?}", source)).with_source(e))?;
        cache.insert(source.to_string(), rx.clone());
        Ok(rx)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Register the function library, resolving names against `set`
pub fn register(env: &mut Environment<'static>, set: Arc<DescriptorSet>) {
    env.add_function("find", move |name: String| -> Value {
        set.find(&name)
            .map(Node::into_value)
            .unwrap_or(Value::from(()))
    });
    env.add_function("flatpkg", flatpkg);
    env.add_function("option", option);

    env.add_function("error", raise);
    env.add_function("log", log);
    env.add_function("logln", logln);
    env.add_function("logf", logf);

    env.add_function("nl", || "\n".to_string());
    env.add_function("rmprefix", |prefix: String, s: String| {
        s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()
    });
    env.add_function("rmsuffix", |suffix: String, s: String| {
        s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string()
    });
    env.add_function("trim", |cuts: String, s: String| {
        s.trim_matches(|c: char| cuts.contains(c)).to_string()
    });
    env.add_function("triml", |cuts: String, s: String| {
        s.trim_start_matches(|c: char| cuts.contains(c)).to_string()
    });
    env.add_function("trimr", |cuts: String, s: String| {
        s.trim_end_matches(|c: char| cuts.contains(c)).to_string()
    });
    env.add_function("trimws", trimws);
    env.add_function("repeat", repeat);
    env.add_function("indent", indent);
    env.add_function("unindent", unindent);
    env.add_function("gsub", |old: String, new: String, s: String| s.replace(&old, &new));
    env.add_function("subln", subln);

    env.add_function("rxquote", rxquote);
    let regexes = Arc::new(RegexCache::default());
    let cache = regexes.clone();
    env.add_function("gsubr", move |regex: String, repl: String, s: String| {
        let rx = cache.compile(&regex)?;
        Ok::<_, Error>(rx.replace_all(&s, repl.as_str()).into_owned())
    });
    let cache = regexes;
    env.add_function("gsubl", move |regex: String, repl: String, s: String| {
        let rx = cache.compile(&regex)?;
        Ok::<_, Error>(rx.replace_all(&s, NoExpand(&repl)).into_owned())
    });

    env.add_function("json", json);
    env.add_function("prettyjson", prettyjson);
    env.add_function("basename", basename);
    env.add_function("dirname", dirname);
    env.add_function("map", map);

    env.add_function("camelcase", camelcase);
    env.add_function("pascalcase", pascalcase);
    env.add_function("snakecase", |sep: String, s: String| case::snake_case(&sep, &s));
    env.add_function("kebabcase", kebabcase);
    env.add_function("shoutycase", shoutycase);
    env.add_function("titlecase", titlecase);

    env.add_function("rustfmt", rustfmt);
    env.add_function("rust_ident", rust_ident);

    env.add_filter("camelcase", camelcase);
    env.add_filter("pascalcase", pascalcase);
    env.add_filter("kebabcase", kebabcase);
    env.add_filter("shoutycase", shoutycase);
    env.add_filter("titlecase", titlecase);
    env.add_filter("trimws", trimws);
    env.add_filter("basename", basename);
    env.add_filter("dirname", dirname);
    env.add_filter("json", json);
    env.add_filter("rxquote", rxquote);
    env.add_filter("rustfmt", rustfmt);
    env.add_filter("rust_ident", rust_ident);
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

/// `error(msg)`: abort the run with `msg`
fn raise(msg: String) -> Result<Value, Error> {
    Err(invalid(msg))
}

fn flatpkg(file: Value) -> Value {
    match Node::from_value(&file) {
        Some(Node::File(f)) => Arc::new(FlatIndex::for_file(f)).into_value(),
        _ => Value::from(()),
    }
}

/// `option(name, file)`: value of a file-level uninterpreted option
///
/// Only the last segment of the option's name is compared with `name`, so
/// `(my.opt).field` is found as `field`.
fn option(name: String, file: Value) -> Value {
    let file = match Node::from_value(&file) {
        Some(Node::File(f)) => f,
        _ => return Value::from(()),
    };

    file.proto
        .options
        .iter()
        .flat_map(|o| o.uninterpreted_option.iter())
        .find(|opt| opt.name.last().is_some_and(|part| part.name_part == name))
        .and_then(option_value)
        .unwrap_or(Value::from(()))
}

/// Concatenate operands, with a space between two adjacent non-strings
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            let prev_str = args[i - 1].kind() == ValueKind::String;
            if !prev_str && arg.kind() != ValueKind::String {
                out.push(' ');
            }
        }
        out.push_str(&arg.to_string());
    }
    out
}

/// Minimal printf: `%v`, `%s`, `%d`, `%q` and `%%`
fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('v' | 's' | 'd' | 'q')) => match args.next() {
                Some(arg) if verb == 'q' => out.push_str(&format!("{:?}", arg.to_string())),
                Some(arg) => out.push_str(&arg.to_string()),
                None => out.push_str(&format!("%!{}(MISSING)", verb)),
            },
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push_str("%!(NOVERB)"),
        }
    }

    let extra: Vec<String> = args.map(|a| a.to_string()).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn log(args: Rest<Value>) -> String {
    tracing::info!(target: LOG_TARGET, "{}", sprint(&args));
    String::new()
}

fn logln(args: Rest<Value>) -> String {
    let line: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tracing::info!(target: LOG_TARGET, "{}", line.join(" "));
    String::new()
}

fn logf(format: String, args: Rest<Value>) -> String {
    tracing::info!(target: LOG_TARGET, "{}", sprintf(&format, &args));
    String::new()
}

fn trimws(s: String) -> String {
    s.trim().to_string()
}

fn repeat(count: i64, s: String) -> Result<String, Error> {
    let count = usize::try_from(count).map_err(|_| invalid("repeat: negative count"))?;
    Ok(s.repeat(count))
}

/// Prefix every non-empty line with `levels` copies of `indent`
fn indent(indent: String, levels: i64, s: String) -> String {
    let prefix = indent.repeat(usize::try_from(levels).unwrap_or(0));
    s.split('\n')
        .map(|line| {
            if line.is_empty() {
                line.to_string()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip `levels` copies of `indent` from lines that start with them
fn unindent(indent: String, levels: i64, s: String) -> String {
    let prefix = indent.repeat(usize::try_from(levels).unwrap_or(0));
    s.split('\n')
        .map(|line| line.strip_prefix(prefix.as_str()).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the first `count` occurrences; a negative count replaces all
fn subln(old: String, new: String, s: String, count: i64) -> String {
    match usize::try_from(count) {
        Ok(n) => s.replacen(&old, &new, n),
        Err(_) => s.replace(&old, &new),
    }
}

fn rxquote(s: String) -> String {
    regex::escape(&s)
}

fn json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| invalid("json: cannot encode value").with_source(e))
}

/// Indented JSON; lines after the first start with `prefix`
fn prettyjson(prefix: String, indent: String, value: Value) -> Result<String, Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| invalid("prettyjson: cannot encode value").with_source(e))?;

    let text = String::from_utf8_lossy(&buf);
    Ok(text.replace('\n', &format!("\n{}", prefix)))
}

/// Last element of a slash-separated path
fn basename(path: String) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

/// Everything but the last element of a slash-separated path, cleaned
fn dirname(path: String) -> String {
    let dir = match path.rfind('/') {
        Some(i) => &path[..=i],
        None => "",
    };
    clean_path(dir)
}

/// Lexical path cleanup: collapse `//`, drop `.`, resolve `..`
fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// `map(k1, v1, k2, v2, ...)`
fn map(pairs: Rest<Value>) -> Result<Value, Error> {
    if pairs.len() % 2 != 0 {
        return Err(invalid("map: odd number of arguments"));
    }
    let mut out = BTreeMap::new();
    for pair in pairs.chunks(2) {
        let key = match pair[0].as_str() {
            Some(s) => s.to_string(),
            None => pair[0].to_string(),
        };
        out.insert(key, pair[1].clone());
    }
    Ok(Value::from_serialize(&out))
}

fn camelcase(s: String) -> String {
    case::camel_case(&s)
}

fn pascalcase(s: String) -> String {
    case::pascal_case(&s)
}

fn kebabcase(s: String) -> String {
    case::kebab_case(&s)
}

fn shoutycase(s: String) -> String {
    case::shouty_case(&s)
}

fn titlecase(s: String) -> String {
    case::title_case(&s)
}

/// Pretty-print a Rust source file
fn rustfmt(source: String) -> Result<String, Error> {
    let file = syn::parse_file(&source)
        .map_err(|e| invalid(format!("rustfmt: cannot parse source: {}", e)))?;
    Ok(prettyplease::unparse(&file))
}

/// Make `name` usable as a Rust identifier
///
/// Keywords become raw identifiers; the few that cannot be raw get a
/// trailing underscore.
fn rust_ident(name: String) -> Result<String, Error> {
    if syn::parse_str::<syn::Ident>(&name).is_ok() {
        return Ok(name);
    }
    if matches!(name.as_str(), "self" | "Self" | "super" | "crate" | "_") {
        return Ok(format!("{}_", name));
    }
    let raw = format!("r#{}", name);
    if syn::parse_str::<syn::Ident>(&raw).is_ok() {
        Ok(raw)
    } else {
        Err(invalid(format!("rust_ident: {:?} is not an identifier", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::compiler::CodeGeneratorRequest;
    use prost_types::uninterpreted_option::NamePart;
    use prost_types::{DescriptorProto, FileDescriptorProto, FileOptions, UninterpretedOption};
    use tracing_subscriber::EnvFilter;

    fn render(set: DescriptorSet, source: &str) -> String {
        let mut env = Environment::new();
        register(&mut env, Arc::new(set));
        env.render_str(source, ()).unwrap()
    }

    fn args(values: &[Value]) -> Rest<Value> {
        Rest(values.to_vec())
    }

    #[test]
    fn test_paths() {
        assert_eq!(basename("a/b/c.proto".into()), "c.proto");
        assert_eq!(basename("a/b/".into()), "b");
        assert_eq!(basename("".into()), ".");
        assert_eq!(basename("///".into()), "/");
        assert_eq!(dirname("a/b/c.proto".into()), "a/b");
        assert_eq!(dirname("c.proto".into()), ".");
        assert_eq!(dirname("/c.proto".into()), "/");
        assert_eq!(dirname("a//b/../c/x".into()), "a/c");
    }

    #[test]
    fn test_indentation() {
        assert_eq!(indent("  ".into(), 2, "a\n\nb".into()), "    a\n\n    b");
        assert_eq!(unindent("\t".into(), 1, "\ta\n\t\tb\nc".into()), "a\n\tb\nc");
    }

    #[test]
    fn test_substitution() {
        assert_eq!(subln("a".into(), "b".into(), "aaa".into(), 2), "bba");
        assert_eq!(subln("a".into(), "b".into(), "aaa".into(), -1), "bbb");
        assert!(repeat(-1, "x".into()).is_err());
        assert_eq!(repeat(3, "ab".into()).unwrap(), "ababab");
    }

    #[test]
    fn test_regex_cache() {
        let cache = RegexCache::default();
        let rx = cache.compile(r"(\w+)\.proto").unwrap();
        assert_eq!(rx.replace_all("foo.proto", "$1.rs"), "foo.rs");
        cache.compile(r"(\w+)\.proto").unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.compile("(").is_err());
        assert_eq!(cache.len(), 1);
        assert_eq!(rxquote("a.b*".into()), r"a\.b\*");
    }

    #[test]
    fn test_regex_replacement_modes() {
        let out = render(
            DescriptorSet::default(),
            r#"{{ gsubr("(a)", "<$1>", "cat") }}|{{ gsubl("(a)", "<$1>", "cat") }}"#,
        );
        assert_eq!(out, "c<a>t|c<$1>t");
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let mut env = Environment::new();
        register(&mut env, Arc::new(DescriptorSet::default()));
        let err = env
            .render_str(r#"{{ gsubr("(", "", "x") }}"#, ())
            .unwrap_err();
        assert!(err.to_string().contains("invalid regex"), "{}", err);
    }

    #[test]
    fn test_trim_directions() {
        let out = render(
            DescriptorSet::default(),
            r#"{{ triml("x", "xxaxx") }}|{{ trimr("x", "xxaxx") }}|{{ trim("x", "xxaxx") }}"#,
        );
        assert_eq!(out, "axx|xxa|a");
    }

    fn option_set() -> DescriptorSet {
        let named = |parts: &[(&str, bool)], value: &str| UninterpretedOption {
            name: parts
                .iter()
                .map(|&(part, is_extension)| NamePart {
                    name_part: part.to_string(),
                    is_extension,
                })
                .collect(),
            identifier_value: Some(value.to_string()),
            ..Default::default()
        };

        DescriptorSet::from_request(CodeGeneratorRequest {
            file_to_generate: vec!["o.proto".to_string()],
            proto_file: vec![FileDescriptorProto {
                name: Some("o.proto".to_string()),
                package: Some("o".to_string()),
                message_type: vec![DescriptorProto {
                    name: Some("Msg".to_string()),
                    ..Default::default()
                }],
                options: Some(FileOptions {
                    uninterpreted_option: vec![
                        named(&[("my.opt", true), ("field", false)], "val"),
                        named(&[("other.opt", true), ("field", false)], "later"),
                    ],
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_option_lookup() {
        let out = render(
            option_set(),
            concat!(
                r#"{{ option("field", find(".o")) }}|"#,
                r#"{{ option("missing", find(".o")) is none }}|"#,
                r#"{{ option("field", "o.proto") is none }}|"#,
                r#"{{ option("field", find(".o.Msg")) is none }}"#,
            ),
        );
        assert_eq!(out, "val|true|true|true");
    }

    #[test]
    fn test_flatpkg() {
        let out = render(
            option_set(),
            concat!(
                r#"{{ flatpkg(find(".o")).messages[".o.Msg"].name }}|"#,
                r#"{{ flatpkg(find(".o")).package.name }}|"#,
                r#"{{ flatpkg(none) is none }}"#,
            ),
        );
        assert_eq!(out, "Msg|o.proto|true");
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_helpers_pass_default_filter() {
        let captured = Capture::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(crate::DEFAULT_LOG_FILTER))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            render(
                DescriptorSet::default(),
                r#"{{ log("HELLO_FROM_TEMPLATE") }}{{ logf("%s=%d", "n", 2) }}"#,
            );
        });

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("HELLO_FROM_TEMPLATE"), "{}", text);
        assert!(text.contains("n=2"), "{}", text);
        assert!(text.contains(LOG_TARGET), "{}", text);
    }

    #[test]
    fn test_json_helpers() {
        let value = map(args(&[
            Value::from("b"),
            Value::from(1),
            Value::from("a"),
            Value::from(true),
        ]))
        .unwrap();
        assert_eq!(json(value.clone()).unwrap(), r#"{"a":true,"b":1}"#);
        assert_eq!(
            prettyjson("> ".into(), "\t".into(), value).unwrap(),
            "{\n> \t\"a\": true,\n> \t\"b\": 1\n> }"
        );
        assert!(map(args(&[Value::from("odd")])).is_err());
    }

    #[test]
    fn test_sprintf() {
        let a = [Value::from("x"), Value::from(3)];
        assert_eq!(sprintf("%s=%d %%", &a), "x=3 %");
        assert_eq!(sprintf("%q", &a[..1]), "\"x\"");
        assert_eq!(sprintf("%v %v", &a[..1]), "x %!v(MISSING)");
        assert_eq!(sprint(&[Value::from(1), Value::from(2), Value::from("s")]), "1 2s");
    }

    #[test]
    fn test_rust_helpers() {
        assert_eq!(rust_ident("name".into()).unwrap(), "name");
        assert_eq!(rust_ident("type".into()).unwrap(), "r#type");
        assert_eq!(rust_ident("self".into()).unwrap(), "self_");
        assert!(rust_ident("1abc".into()).is_err());

        let formatted = rustfmt("fn main(){let x=1;}".into()).unwrap();
        assert_eq!(formatted, "fn main() {\n    let x = 1;\n}\n");
        assert!(rustfmt("fn (".into()).is_err());
    }

    #[test]
    fn test_error_helper() {
        let err = raise("boom".into()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(err.to_string().contains("boom"));
    }
}
