// src/lang/text.rs

//! Parser for the assembly text form.
//!
//! A document is a preamble of `# `-prefixed metadata lines followed by the
//! body. The preamble declares the protocol version (`# NETQASM 0.0`), the
//! application id (`# APPID 7`) and optional macros (`# DEFINE name value`)
//! whose `$name` occurrences are substituted into the body before parsing.
//! The body holds one instruction or one `label:` per line; `//` starts a
//! line comment and `/* ... */` a block comment.
//!
//! Parsing produces a [`PreSubroutine`]: branch labels stay symbolic and
//! integer array indices are materialized into fresh registers here, so the
//! result still needs [`PreSubroutine::finalize`].

use std::collections::HashSet;

use crate::core::{AppId, HostLine, NetQasmError, NETQASM_VERSION};
use crate::isa::instr::Opcode;
use crate::isa::operand::{Address, ArrayEntry, ArraySlice, Operand, Register, RegisterName};
use crate::subroutine::{Cmd, PreSubroutine};

const PREAMBLE_MARKER: &str = "# ";
const NETQASM_KEYWORD: &str = "NETQASM";
const APPID_KEYWORD: &str = "APPID";
const DEFINE_KEYWORD: &str = "DEFINE";

/// Parses an assembly document into a [`PreSubroutine`].
pub fn parse(text: &str) -> Result<PreSubroutine, NetQasmError> {
    let stripped = strip_block_comments(text)?;
    let preamble = parse_preamble(&stripped)?;
    if preamble.version.0 != NETQASM_VERSION.0 {
        return Err(NetQasmError::Encoding {
            message: format!(
                "document version {}.{} does not match protocol version {}.{}",
                preamble.version.0, preamble.version.1, NETQASM_VERSION.0, NETQASM_VERSION.1,
            ),
        });
    }

    // First pass tokenizes every body line so fresh-register allocation for
    // integer array indices can see all registers the document uses.
    let mut lines = Vec::new();
    for (index, raw) in stripped.lines().enumerate() {
        if raw.trim_start().starts_with(PREAMBLE_MARKER) {
            continue;
        }
        let expanded = apply_macros(raw, &preamble.macros);
        let without_comment = expanded.split("//").next().unwrap_or("").trim().to_string();
        if without_comment.is_empty() {
            continue;
        }
        lines.push((HostLine(index as u32 + 1), without_comment));
    }
    let mut used = used_registers(&lines)?;

    let mut pre = PreSubroutine::new(preamble.app_id);
    for (lineno, line) in lines {
        if let Some(label) = line.strip_suffix(':') {
            let label = label.trim();
            check_identifier(label, lineno)?;
            pre.push_label(label);
            continue;
        }
        let mut tokens = line.split_whitespace();
        let mnemonic = tokens.next().ok_or_else(|| syntax_error(lineno, "empty line"))?;
        let opcode = Opcode::from_mnemonic(mnemonic).ok_or_else(|| {
            syntax_error(lineno, &format!("unknown instruction `{mnemonic}`"))
        })?;
        let mut operands = Vec::new();
        for token in tokens {
            operands.push(parse_operand(token, lineno, &mut used, &mut pre)?);
        }
        pre.push(Cmd::with_lineno(opcode, operands, lineno));
    }
    Ok(pre)
}

struct Preamble {
    version: (u8, u8),
    app_id: AppId,
    macros: Vec<(String, String)>,
}

fn parse_preamble(text: &str) -> Result<Preamble, NetQasmError> {
    let mut version = None;
    let mut app_id = None;
    let mut macros = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let lineno = HostLine(index as u32 + 1);
        let Some(rest) = raw.trim_start().strip_prefix(PREAMBLE_MARKER) else {
            continue;
        };
        let mut tokens = rest.split_whitespace();
        match tokens.next() {
            Some(NETQASM_KEYWORD) => {
                let value = tokens
                    .next()
                    .ok_or_else(|| syntax_error(lineno, "missing version"))?;
                let (major, minor) = value
                    .split_once('.')
                    .ok_or_else(|| syntax_error(lineno, "version is not `major.minor`"))?;
                version = Some((
                    parse_int::<u8>(major, lineno)?,
                    parse_int::<u8>(minor, lineno)?,
                ));
            }
            Some(APPID_KEYWORD) => {
                let value = tokens
                    .next()
                    .ok_or_else(|| syntax_error(lineno, "missing application id"))?;
                app_id = Some(AppId(parse_int::<u16>(value, lineno)?));
            }
            Some(DEFINE_KEYWORD) => {
                let name = tokens
                    .next()
                    .ok_or_else(|| syntax_error(lineno, "missing macro name"))?;
                check_identifier(name, lineno)?;
                let value = rest.split_whitespace().skip(2).collect::<Vec<_>>().join(" ");
                // A braced value may span multiple tokens.
                let value = value
                    .strip_prefix('{')
                    .and_then(|v| v.strip_suffix('}'))
                    .unwrap_or(&value);
                macros.push((name.to_string(), value.trim().to_string()));
            }
            Some(other) => {
                return Err(syntax_error(lineno, &format!("unknown preamble keyword `{other}`")));
            }
            None => return Err(syntax_error(lineno, "empty preamble line")),
        }
    }
    let version = version.ok_or_else(|| NetQasmError::Encoding {
        message: format!("missing `{PREAMBLE_MARKER}{NETQASM_KEYWORD}` preamble line"),
    })?;
    let app_id = app_id.ok_or_else(|| NetQasmError::Encoding {
        message: format!("missing `{PREAMBLE_MARKER}{APPID_KEYWORD}` preamble line"),
    })?;
    Ok(Preamble { version, app_id, macros })
}

/// Replaces `/* ... */` comments with spaces, keeping newlines so reported
/// line numbers stay accurate.
fn strip_block_comments(text: &str) -> Result<String, NetQasmError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let after = &rest[start..];
        let end = after.find("*/").ok_or_else(|| NetQasmError::Encoding {
            message: "unterminated block comment".to_string(),
        })?;
        for ch in after[..end + 2].chars() {
            out.push(if ch == '\n' { '\n' } else { ' ' });
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn apply_macros(line: &str, macros: &[(String, String)]) -> String {
    let mut out = line.to_string();
    for (name, value) in macros {
        out = out.replace(&format!("${name}"), value);
    }
    out
}

fn used_registers(
    lines: &[(HostLine, String)],
) -> Result<HashSet<Register>, NetQasmError> {
    let mut used = HashSet::new();
    for (_, line) in lines {
        for token in line.split_whitespace().skip(1) {
            for part in token.split(['@', '[', ']', ':']) {
                if let Ok(reg) = part.parse::<Register>() {
                    used.insert(reg);
                }
            }
        }
    }
    Ok(used)
}

/// Parses one operand token. An integer index inside `@addr[...]` is
/// materialized here: a fresh register is allocated, a `set` command pushed,
/// and the register substituted for the integer.
fn parse_operand(
    token: &str,
    lineno: HostLine,
    used: &mut HashSet<Register>,
    pre: &mut PreSubroutine,
) -> Result<Operand, NetQasmError> {
    if let Some(rest) = token.strip_prefix('@') {
        return parse_address_operand(rest, lineno, used, pre);
    }
    if let Ok(reg) = token.parse::<Register>() {
        return Ok(Operand::Register(reg));
    }
    if let Ok(value) = token.parse::<i32>() {
        return Ok(Operand::Immediate(value));
    }
    check_identifier(token, lineno)?;
    Ok(Operand::Label(token.to_string()))
}

fn parse_address_operand(
    rest: &str,
    lineno: HostLine,
    used: &mut HashSet<Register>,
    pre: &mut PreSubroutine,
) -> Result<Operand, NetQasmError> {
    let (address_text, index_text) = match rest.split_once('[') {
        None => (rest, None),
        Some((address, bracketed)) => {
            let inner = bracketed.strip_suffix(']').ok_or_else(|| {
                syntax_error(lineno, &format!("missing `]` in `@{rest}`"))
            })?;
            (address, Some(inner))
        }
    };
    let address = Address(parse_int::<i32>(address_text, lineno)?);
    let Some(index_text) = index_text else {
        return Ok(Operand::Address(address));
    };
    match index_text.split_once(':') {
        None => {
            let index = index_register(index_text, lineno, used, pre)?;
            Ok(Operand::ArrayEntry(ArrayEntry { address, index }))
        }
        Some((start_text, stop_text)) => {
            let start = index_register(start_text, lineno, used, pre)?;
            let stop = index_register(stop_text, lineno, used, pre)?;
            Ok(Operand::ArraySlice(ArraySlice { address, start, stop }))
        }
    }
}

fn index_register(
    text: &str,
    lineno: HostLine,
    used: &mut HashSet<Register>,
    pre: &mut PreSubroutine,
) -> Result<Register, NetQasmError> {
    if let Ok(reg) = text.parse::<Register>() {
        return Ok(reg);
    }
    let value = parse_int::<i32>(text, lineno)?;
    let reg = fresh_index_register(used, lineno)?;
    pre.push(Cmd::with_lineno(
        Opcode::Set,
        vec![Operand::Register(reg), Operand::Immediate(value)],
        lineno,
    ));
    Ok(reg)
}

fn fresh_index_register(
    used: &mut HashSet<Register>,
    lineno: HostLine,
) -> Result<Register, NetQasmError> {
    for index in 0..crate::isa::operand::REGISTERS_PER_BANK {
        let reg = Register { name: RegisterName::R, index };
        if used.insert(reg) {
            return Ok(reg);
        }
    }
    Err(syntax_error(lineno, "no general-purpose register left for an array index"))
}

fn check_identifier(name: &str, lineno: HostLine) -> Result<(), NetQasmError> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(syntax_error(lineno, &format!("invalid identifier `{name}`")))
    }
}

fn parse_int<T: std::str::FromStr>(text: &str, lineno: HostLine) -> Result<T, NetQasmError> {
    text.parse().map_err(|_| syntax_error(lineno, &format!("invalid number `{text}`")))
}

fn syntax_error(lineno: HostLine, message: &str) -> NetQasmError {
    NetQasmError::Encoding { message: format!("{lineno}: {message}") }
}
