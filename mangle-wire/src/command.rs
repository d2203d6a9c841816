use std::fmt;

use mangle_common::num;
use mangle_core::{Mode, OpSpec, OperandSpec};

/// What a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Field,
    Iface,
    Rule,
    Process,
    State,
}

impl Target {
    fn parse(text: &str) -> Result<Self, String> {
        Ok(match text {
            "field" => Self::Field,
            "iface" => Self::Iface,
            "rule" => Self::Rule,
            "process" => Self::Process,
            "state" => Self::State,
            other => return Err(format!("unknown object {other:?}")),
        })
    }
}

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FieldAdd { name: String, offset: i32, len: u16, mask: Option<u8> },
    FieldDel(String),
    FieldShow(Option<String>),
    IfaceAdd(String),
    IfaceDel(String),
    IfaceShow(Option<String>),
    RuleAdd { name: String, matches: Vec<OpSpec>, writes: Vec<OpSpec> },
    RuleDel(String),
    RuleShow(Option<String>),
    /// Routes are `(rule, output interface)` pairs in evaluation order.
    ProcessAdd { input: String, routes: Vec<(String, String)> },
    ProcessDel(String),
    ProcessShow(Option<String>),
    StateShow(Option<String>),
}

impl Command {
    /// Parses the tokens of one control line.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, String> {
        let mut tokens = tokens.iter().map(AsRef::as_ref);

        let target = Target::parse(tokens.next().ok_or("empty command")?)?;
        let mode = match tokens.next() {
            Some("add") => Mode::Add,
            Some("del") => Mode::Del,
            Some("show") => Mode::Show,
            Some(other) => return Err(format!("unknown mode {other:?}")),
            None => return Err("missing mode".to_string()),
        };
        let args: Vec<&str> = tokens.collect();

        let command = match (target, mode) {
            (Target::Field, Mode::Add) => parse_field(&args)?,
            (Target::Field, Mode::Del) => Self::FieldDel(one(&args)?),
            (Target::Field, Mode::Show) => Self::FieldShow(optional(&args)?),
            (Target::Iface, Mode::Add) => Self::IfaceAdd(one(&args)?),
            (Target::Iface, Mode::Del) => Self::IfaceDel(one(&args)?),
            (Target::Iface, Mode::Show) => Self::IfaceShow(optional(&args)?),
            (Target::Rule, Mode::Add) => parse_rule(&args)?,
            (Target::Rule, Mode::Del) => Self::RuleDel(one(&args)?),
            (Target::Rule, Mode::Show) => Self::RuleShow(optional(&args)?),
            (Target::Process, Mode::Add) => parse_process(&args)?,
            (Target::Process, Mode::Del) => Self::ProcessDel(one(&args)?),
            (Target::Process, Mode::Show) => Self::ProcessShow(optional(&args)?),
            (Target::State, Mode::Show) => Self::StateShow(optional(&args)?),
            (Target::State, _) => return Err("states can only be shown".to_string()),
        };

        Ok(command)
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::FieldAdd { .. } | Self::IfaceAdd(_) | Self::RuleAdd { .. } | Self::ProcessAdd { .. } => {
                Mode::Add
            }
            Self::FieldDel(_) | Self::IfaceDel(_) | Self::RuleDel(_) | Self::ProcessDel(_) => Mode::Del,
            Self::FieldShow(_) |
            Self::IfaceShow(_) |
            Self::RuleShow(_) |
            Self::ProcessShow(_) |
            Self::StateShow(_) => Mode::Show,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show(f: &mut fmt::Formatter<'_>, what: &str, name: &Option<String>) -> fmt::Result {
            match name {
                Some(name) => write!(f, "{what} show {name}"),
                None => write!(f, "{what} show"),
            }
        }

        match self {
            Self::FieldAdd { name, offset, len, mask } => {
                write!(f, "field add {name} offt={offset} len={len}")?;
                if let Some(mask) = mask {
                    write!(f, " mask={mask:#04x}")?;
                }
                Ok(())
            }
            Self::FieldDel(name) => write!(f, "field del {name}"),
            Self::FieldShow(name) => show(f, "field", name),
            Self::IfaceAdd(name) => write!(f, "iface add {name}"),
            Self::IfaceDel(name) => write!(f, "iface del {name}"),
            Self::IfaceShow(name) => show(f, "iface", name),
            Self::RuleAdd { name, matches, writes } => {
                write!(f, "rule add {name}")?;
                for op in matches {
                    write!(f, " match {op}")?;
                }
                for op in writes {
                    write!(f, " write {op}")?;
                }
                Ok(())
            }
            Self::RuleDel(name) => write!(f, "rule del {name}"),
            Self::RuleShow(name) => show(f, "rule", name),
            Self::ProcessAdd { input, routes } => {
                write!(f, "process add {input}")?;
                for (rule, output) in routes {
                    write!(f, " {rule}:{output}")?;
                }
                Ok(())
            }
            Self::ProcessDel(input) => write!(f, "process del {input}"),
            Self::ProcessShow(input) => show(f, "process", input),
            Self::StateShow(name) => show(f, "state", name),
        }
    }
}

fn one(args: &[&str]) -> Result<String, String> {
    match args {
        [name] => Ok(name.to_string()),
        [] => Err("missing name".to_string()),
        _ => Err(format!("unexpected arguments {:?}", &args[1..])),
    }
}

fn optional(args: &[&str]) -> Result<Option<String>, String> {
    match args {
        [] => Ok(None),
        _ => one(args).map(Some),
    }
}

fn parse_field(args: &[&str]) -> Result<Command, String> {
    let (name, args) = args.split_first().ok_or("missing name")?;

    let mut offset = None;
    let mut len = None;
    let mut mask = None;

    for arg in args {
        let (key, value) = arg.split_once('=').ok_or_else(|| format!("expected key=value, got {arg:?}"))?;
        let err = |e: mangle_common::ValueError| format!("{key}: {e}");
        match key {
            "offt" => offset = Some(num::parse_offset(value).map_err(err)?),
            "len" => len = Some(num::parse_len(value).map_err(err)?),
            "mask" => mask = Some(num::parse_mask(value).map_err(err)?),
            other => return Err(format!("unknown field attribute {other:?}")),
        }
    }

    Ok(Command::FieldAdd {
        name: name.to_string(),
        offset: offset.ok_or("missing offt")?,
        len: len.ok_or("missing len")?,
        mask,
    })
}

fn parse_rule(args: &[&str]) -> Result<Command, String> {
    let (name, mut args) = args.split_first().ok_or("missing name")?;

    let mut matches = Vec::new();
    let mut writes = Vec::new();

    while let [kind, rest @ ..] = args {
        let [op, rest @ ..] = rest else {
            return Err(format!("missing operation after {kind:?}"));
        };

        match *kind {
            "match" => matches.push(parse_op(op)?),
            "write" => writes.push(parse_op(op)?),
            other => return Err(format!("expected match or write, got {other:?}")),
        }
        args = rest;
    }

    Ok(Command::RuleAdd { name: name.to_string(), matches, writes })
}

fn parse_process(args: &[&str]) -> Result<Command, String> {
    let (input, args) = args.split_first().ok_or("missing input interface")?;

    let routes = args
        .iter()
        .map(|route| match route.split_once(':') {
            Some((rule, output)) if !rule.is_empty() && !output.is_empty() => {
                Ok((rule.to_string(), output.to_string()))
            }
            _ => Err(format!("expected RULE:OUTPUT, got {route:?}")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Command::ProcessAdd { input: input.to_string(), routes })
}

/// Parses `dest=source`, splitting at the first `=` outside quotes.
fn parse_op(text: &str) -> Result<OpSpec, String> {
    let mut quoted = false;
    let split = text.char_indices().find(|&(_, c)| {
        if c == '"' {
            quoted = !quoted;
        }
        c == '=' && !quoted
    });

    let Some((at, _)) = split else {
        return Err(format!("expected DEST=SOURCE, got {text:?}"));
    };

    Ok(OpSpec::new(parse_operand(&text[..at])?, parse_operand(&text[at + 1..])?))
}

/// Parses `FIELD`, `FIELD:LITERAL` or `FIELD@STATE`.
fn parse_operand(text: &str) -> Result<OperandSpec, String> {
    let operand = match text.find([':', '@']) {
        None => OperandSpec::packet(text),
        Some(at) => {
            let (field, rest) = text.split_at(at);
            let (sep, bound) = rest.split_at(1);
            if sep == ":" {
                OperandSpec::value(field, bound)
            } else if bound.is_empty() {
                return Err(format!("missing state name in {text:?}"));
            } else {
                OperandSpec::state(field, bound)
            }
        }
    };

    if operand.field.is_empty() {
        return Err(format!("missing field name in {text:?}"));
    }

    Ok(operand)
}
