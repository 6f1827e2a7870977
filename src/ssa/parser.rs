//! Textual IR reader.
//!
//! ```text
//! func main.sum {
//!   zero 0 24
//!   spill X10 int64 0
//! b1:
//!   v1 = InitMem <mem>
//!   v2 = Arg <int64> [0] : X10
//!   v3 = AddConst <int64> [1] v2 : X11
//!   v4 = StaticCall <mem> {fmt.Println} v1
//!   Branch Lt v2 v3 -> b2 b3 likely
//! b2:
//!   Ret
//! b3:
//!   Exit
//! }
//! ```
//!
//! Locations after ` : ` are register names of the target or `@off` for a
//! stack slot. `#` starts a comment. Value and block numbers are kept as
//! written; forward references are resolved when the function closes.

use super::*;
use crate::core::error::{CompileError, CompileResult};
use crate::core::prog::LinkArch;
use crate::symtab::SymbolTable;
use hashbrown::HashSet;

/// Parse every function in `src`, resolving registers for `arch` and callee
/// symbols in `symtab`.
pub fn parse_funcs(src: &str, arch: &LinkArch, symtab: &SymbolTable) -> CompileResult<Vec<Func>> {
    let mut funcs = Vec::new();
    let mut cur: Option<FuncState> = None;
    let mut last_line = 0;

    for (i, raw) in src.lines().enumerate() {
        let line_no = i + 1;
        last_line = line_no;
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let err = |reason: String| CompileError::Parse { line: line_no, reason };

        if line == "}" {
            let st = cur.take().ok_or_else(|| err("unexpected `}`".to_string()))?;
            funcs.push(st.finish().map_err(err)?);
            continue;
        }

        match cur.as_mut() {
            Some(st) => st.line(line, arch, symtab).map_err(err)?,
            None => {
                let name = line
                    .strip_prefix("func ")
                    .and_then(|rest| rest.strip_suffix('{'))
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| err(format!("expected `func <name> {{`, found {line:?}")))?;
                cur = Some(FuncState::new(name));
            }
        }
    }

    if let Some(st) = cur {
        return Err(CompileError::Parse {
            line: last_line,
            reason: format!("function {} is not closed", st.func.name),
        });
    }
    log::debug!("parsed {} functions", funcs.len());
    Ok(funcs)
}

struct FuncState {
    func: Func,
    block: Option<usize>,
    terminated: bool,
}

type LineResult<T> = Result<T, String>;

fn parse_id(tok: &str, prefix: char) -> LineResult<u32> {
    tok.strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| format!("expected {prefix}<number>, found {tok:?}"))
}

fn parse_num<T: FromStr>(tok: Option<&str>, what: &str) -> LineResult<T> {
    let tok = tok.ok_or_else(|| format!("missing {what}"))?;
    tok.parse().map_err(|_| format!("invalid {what} {tok:?}"))
}

fn parse_reg(tok: Option<&str>, arch: &LinkArch) -> LineResult<RegId> {
    let tok = tok.ok_or("missing register")?;
    (arch.reg_by_name)(tok).ok_or_else(|| format!("unknown {} register {tok:?}", arch.name))
}

fn parse_type(tok: Option<&str>) -> LineResult<Type> {
    let tok = tok.ok_or("missing type")?;
    let inner = tok.strip_prefix('<').and_then(|t| t.strip_suffix('>')).unwrap_or(tok);
    inner.parse()
}

fn parse_likely(tok: Option<&str>) -> LineResult<Likely> {
    match tok {
        None => Ok(Likely::Unknown),
        Some("likely") => Ok(Likely::Likely),
        Some("unlikely") => Ok(Likely::Unlikely),
        Some(t) => Err(format!("unexpected {t:?} after successors")),
    }
}

impl FuncState {
    fn new(name: &str) -> Self {
        Self { func: Func::new(name), block: None, terminated: false }
    }

    fn open_block(&mut self) -> LineResult<&mut Block> {
        match self.block {
            Some(idx) if !self.terminated => Ok(&mut self.func.blocks[idx]),
            Some(_) => Err("instruction after block terminator".to_string()),
            None => Err("instruction outside of a block".to_string()),
        }
    }

    fn line(&mut self, line: &str, arch: &LinkArch, symtab: &SymbolTable) -> LineResult<()> {
        let mut toks = line.split_whitespace();
        let first = toks.next().unwrap_or_default();

        match first {
            "zero" => {
                let off = parse_num(toks.next(), "offset")?;
                let len = parse_num(toks.next(), "length")?;
                self.func.zero_ranges.push((off, len));
            }
            "spill" | "result" => {
                let slot = RegSlot {
                    reg: parse_reg(toks.next(), arch)?,
                    ty: parse_type(toks.next())?,
                    off: parse_num(toks.next(), "offset")?,
                };
                if first == "spill" {
                    self.func.spilled_args.push(slot);
                } else {
                    self.func.result_slots.push(slot);
                }
            }
            "Plain" | "If" | "Branch" | "Ret" | "Exit" => self.terminator(line)?,
            _ if first.starts_with('b') && first.ends_with(':') => {
                if self.block.is_some() && !self.terminated {
                    return Err("previous block has no terminator".to_string());
                }
                let id = parse_id(first.trim_end_matches(':'), 'b')?;
                if self.func.block(id).is_some() {
                    return Err(format!("block b{id} defined twice"));
                }
                self.func.blocks.push(Block::new(id, BlockKind::Plain));
                self.block = Some(self.func.blocks.len() - 1);
                self.terminated = false;
            }
            _ if first.starts_with('v') => self.value(line, arch, symtab)?,
            _ => return Err(format!("cannot parse {line:?}")),
        }
        Ok(())
    }

    fn value(&mut self, line: &str, arch: &LinkArch, symtab: &SymbolTable) -> LineResult<()> {
        let (def, loc) = match line.rsplit_once(" : ") {
            Some((def, loc)) => (def, Some(loc.trim())),
            None => (line, None),
        };
        let mut toks = def.split_whitespace();
        let id = parse_id(toks.next().unwrap_or_default(), 'v')?;
        if toks.next() != Some("=") {
            return Err("expected `=` after value name".to_string());
        }
        let op_tok = toks.next().ok_or("missing op")?;
        let op: Op = op_tok.parse().map_err(|_| format!("unknown op {op_tok:?}"))?;
        let ty = parse_type(toks.next())?;
        let mut v = Value::new(id, op, ty);

        for tok in toks {
            if let Some(aux) = tok.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                if op == Op::ConstFloat {
                    v.aux_float = parse_num(Some(aux), "float aux")?;
                } else {
                    v.aux_int = parse_num(Some(aux), "aux")?;
                }
            } else if let Some(name) = tok.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
                let sym = match name.rsplit_once('.') {
                    Some((path, name)) => symtab.new_pkg(path, "").map_err(|e| e.to_string())?.lookup(name),
                    None => symtab.local_pkg().lookup(name),
                };
                if op == Op::StaticCall {
                    sym.set_func(true);
                }
                v.sym = Some(sym);
            } else {
                v.args.push(parse_id(tok, 'v')?);
            }
        }

        v.loc = match loc {
            None => Location::None,
            Some(off) if off.starts_with('@') => Location::Stack(parse_num(Some(&off[1..]), "stack offset")?),
            Some(reg) => Location::Reg(parse_reg(Some(reg), arch)?),
        };

        self.open_block()?.values.push(id);
        if !self.func.add_value(v) {
            return Err(format!("value v{id} defined twice"));
        }
        Ok(())
    }

    fn terminator(&mut self, line: &str) -> LineResult<()> {
        let (head, succs) = match line.split_once("->") {
            Some((head, succs)) => (head, succs),
            None => (line, ""),
        };
        let mut toks = head.split_whitespace();
        let kind = match toks.next().unwrap_or_default() {
            "Plain" => BlockKind::Plain,
            "If" => BlockKind::If,
            "Branch" => {
                let c = toks.next().ok_or("missing branch condition")?;
                BlockKind::Branch(c.parse().map_err(|_| format!("unknown condition {c:?}"))?)
            }
            "Ret" => BlockKind::Ret,
            _ => BlockKind::Exit,
        };
        let controls = toks.map(|t| parse_id(t, 'v')).collect::<LineResult<Vec<_>>>()?;

        let mut succ_toks = succs.split_whitespace().peekable();
        let mut targets = Vec::new();
        while let Some(t) = succ_toks.next_if(|t| t.starts_with('b')) {
            targets.push(parse_id(t, 'b')?);
        }
        let likely = parse_likely(succ_toks.next())?;

        let (want_controls, want_succs) = match kind {
            BlockKind::Plain => (0, 1),
            BlockKind::If => (1, 2),
            BlockKind::Branch(_) => (2, 2),
            BlockKind::Ret | BlockKind::Exit => (0, 0),
        };
        if controls.len() != want_controls || targets.len() != want_succs {
            return Err(format!(
                "{kind} takes {want_controls} controls and {want_succs} successors"
            ));
        }

        let b = self.open_block()?;
        b.kind = kind;
        b.controls = controls;
        b.succs = targets;
        b.likely = likely;
        self.terminated = true;
        Ok(())
    }

    fn finish(self) -> LineResult<Func> {
        if self.block.is_some() && !self.terminated {
            return Err("last block has no terminator".to_string());
        }
        let f = self.func;
        let blocks: HashSet<BlockId> = f.blocks.iter().map(|b| b.id).collect();

        for v in f.values() {
            if let Some(n) = v.op.arg_count() {
                if v.args.len() != n {
                    return Err(format!("{v} = {} takes {n} arguments, has {}", v.op, v.args.len()));
                }
            }
            if let Some(a) = v.args.iter().find(|&&a| f.value(a).is_none()) {
                return Err(format!("{v} uses undefined value v{a}"));
            }
        }
        for b in &f.blocks {
            if let Some(c) = b.controls.iter().find(|&&c| f.value(c).is_none()) {
                return Err(format!("{b} is controlled by undefined value v{c}"));
            }
            if let Some(s) = b.succs.iter().find(|s| !blocks.contains(*s)) {
                return Err(format!("{b} jumps to undefined block b{s}"));
            }
        }
        Ok(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riscv64::{self, LINK_RISCV64};

    const SRC: &str = "
func main.sum {
  zero 0 24
  spill X10 int64 0
b1:
  v1 = InitMem <mem>
  v2 = Arg <int64> [0] : X10
  v3 = AddConst <int64> [1] v2 : X11   # increment
  v4 = StaticCall <mem> {fmt.Println} v1
  v5 = ConstFloat <float64> [2.5] : F1
  v6 = StoreReg <int64> v3 : @16
  Branch Lt v2 v3 -> b3 b2 unlikely
b2:
  Ret
b3:
  Exit
}
";

    #[test]
    fn test_parse_function() {
        let symtab = SymbolTable::new("main", "main");
        let funcs = parse_funcs(SRC, &LINK_RISCV64, &symtab).unwrap();
        assert_eq!(funcs.len(), 1);
        let f = &funcs[0];
        assert_eq!(f.name, "main.sum");
        assert_eq!(f.zero_ranges, vec![(0, 24)]);
        assert_eq!(f.spilled_args[0].reg, riscv64::x(10));

        let v3 = f.value(3).unwrap();
        assert_eq!(v3.op, Op::AddConst);
        assert_eq!(v3.aux_int, 1);
        assert_eq!(v3.args, vec![2]);
        assert_eq!(v3.loc, Location::Reg(riscv64::x(11)));
        assert_eq!(f.value(5).unwrap().aux_float, 2.5);
        assert_eq!(f.value(6).unwrap().loc, Location::Stack(16));

        let call = f.value(4).unwrap();
        let callee = call.sym.as_ref().unwrap();
        assert_eq!(callee.to_string(), "fmt.Println");
        assert!(callee.is_func());

        let b1 = &f.blocks[0];
        assert_eq!(b1.kind, BlockKind::Branch(Cond::Lt));
        assert_eq!(b1.controls, vec![2, 3]);
        assert_eq!(b1.succs, vec![3, 2]);
        assert_eq!(b1.likely, Likely::Unlikely);
    }

    #[test]
    fn test_parse_errors() {
        let symtab = SymbolTable::new("main", "main");
        let parse = |src: &str| parse_funcs(src, &LINK_RISCV64, &symtab);

        let err = parse("func f {\nb1:\n  v1 = Add <int64> v2 v3 : X5\n  Ret\n}\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 5, .. }), "{err}");

        let err = parse("func f {\nb1:\n  v1 = Bogus <int64>\n").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 3, .. }), "{err}");

        let err = parse("func f {\nb1:\n  Plain -> b9\n}\n").unwrap_err();
        assert!(err.to_string().contains("undefined block b9"), "{err}");

        let err = parse("func f {\nb1:\n  v1 = Const <int64> [1] : Y1\n").unwrap_err();
        assert!(err.to_string().contains("unknown riscv64 register"), "{err}");

        assert!(parse("func f {\nb1:\n  Ret\n").is_err());
    }
}
