//! Compact text form of a query tree.
//!
//! ```text
//! query := leaf | '(' query* op | ']' slot ':' str str | '}' slot ':' str
//!        | '{' slot ':' str | '!' str str
//! leaf  := '[' str ['@' pos] ['#' wqf]
//! str   := len ':' bytes
//! op    := '&' | '|' | '%' | '+' | '-' | '^' | '~' window | '"' window
//!        | '*' size | '=' | '>' | '.' factor ';'
//! ```
//!
//! An empty string is the query matching nothing.

use nom::branch::alt;
use nom::bytes::complete::take_till;
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map, map_res, opt, value};
use nom::multi::{length_data, many0};
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};

use crate::core::error::{Error, Result};
use crate::core::registry::Registry;
use crate::core::types::{TermCount, ValueSlot};
use crate::query::ast::{Op, Query};

pub fn serialise(query: &Query) -> Vec<u8> {
    let mut out = Vec::new();
    write_query(query, &mut out);
    out
}

fn write_counted(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn write_query(query: &Query, out: &mut Vec<u8>) {
    match query {
        Query::MatchNothing => {}
        Query::Term { term, wqf, pos } => {
            out.push(b'[');
            write_counted(out, term.as_bytes());
            if *pos != 0 {
                out.extend_from_slice(format!("@{}", pos).as_bytes());
            }
            if *wqf != 1 {
                out.extend_from_slice(format!("#{}", wqf).as_bytes());
            }
        }
        Query::Compound { op, subqs, param } => {
            out.push(b'(');
            for q in subqs {
                write_query(q, out);
            }
            let code = match op {
                Op::And => "&".to_string(),
                Op::Or => "|".to_string(),
                Op::Filter => "%".to_string(),
                Op::AndMaybe => "+".to_string(),
                Op::AndNot => "-".to_string(),
                Op::Xor => "^".to_string(),
                Op::Near => format!("~{}", param),
                Op::Phrase => format!("\"{}", param),
                Op::EliteSet => format!("*{}", param),
                Op::Synonym => "=".to_string(),
                Op::Max => ">".to_string(),
            };
            out.extend_from_slice(code.as_bytes());
        }
        Query::ScaleWeight { factor, subq } => {
            out.push(b'(');
            write_query(subq, out);
            out.extend_from_slice(format!(".{};", factor).as_bytes());
        }
        Query::ValueRange { slot, lo, hi } => {
            out.extend_from_slice(format!("]{}:", slot).as_bytes());
            write_counted(out, lo);
            write_counted(out, hi);
        }
        Query::ValueGe { slot, lo } => {
            out.extend_from_slice(format!("}}{}:", slot).as_bytes());
            write_counted(out, lo);
        }
        Query::ValueLe { slot, hi } => {
            out.extend_from_slice(format!("{{{}:", slot).as_bytes());
            write_counted(out, hi);
        }
        Query::External(source) => {
            out.push(b'!');
            write_counted(out, source.0.name().as_bytes());
            write_counted(out, &source.0.serialise());
        }
    }
}

/// A parsed query before it's checked and rebuilt.
#[derive(Debug)]
enum Raw<'a> {
    Term { term: &'a [u8], pos: u32, wqf: u32 },
    Compound { subqs: Vec<Raw<'a>>, op: RawOp },
    ValueRange { slot: ValueSlot, lo: &'a [u8], hi: &'a [u8] },
    ValueGe { slot: ValueSlot, lo: &'a [u8] },
    ValueLe { slot: ValueSlot, hi: &'a [u8] },
    External { name: &'a [u8], data: &'a [u8] },
}

#[derive(Debug, Clone, Copy)]
enum RawOp {
    Op(Op, TermCount),
    Scale(f64),
}

fn number(i: &[u8]) -> IResult<&[u8], u32> {
    map_res(digit1, |d: &[u8]| std::str::from_utf8(d).map_err(|_| ()).and_then(|s| s.parse::<u32>().map_err(|_| ())))
        .parse(i)
}

fn counted(i: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(terminated(number, char(':'))).parse(i)
}

fn slot(i: &[u8]) -> IResult<&[u8], ValueSlot> {
    terminated(number, char(':')).parse(i)
}

fn factor(i: &[u8]) -> IResult<&[u8], f64> {
    delimited(
        char('.'),
        map_res(take_till(|c| c == b';'), |d: &[u8]| {
            std::str::from_utf8(d).map_err(|_| ()).and_then(|s| s.parse::<f64>().map_err(|_| ()))
        }),
        char(';'),
    )
    .parse(i)
}

fn op(i: &[u8]) -> IResult<&[u8], RawOp> {
    alt((
        value(RawOp::Op(Op::And, 0), char('&')),
        value(RawOp::Op(Op::Or, 0), char('|')),
        value(RawOp::Op(Op::Filter, 0), char('%')),
        value(RawOp::Op(Op::AndMaybe, 0), char('+')),
        value(RawOp::Op(Op::AndNot, 0), char('-')),
        value(RawOp::Op(Op::Xor, 0), char('^')),
        map(preceded(char('~'), number), |n| RawOp::Op(Op::Near, n)),
        map(preceded(char('"'), number), |n| RawOp::Op(Op::Phrase, n)),
        map(preceded(char('*'), number), |n| RawOp::Op(Op::EliteSet, n)),
        value(RawOp::Op(Op::Synonym, 0), char('=')),
        value(RawOp::Op(Op::Max, 0), char('>')),
        map(factor, RawOp::Scale),
    ))
    .parse(i)
}

fn leaf(i: &[u8]) -> IResult<&[u8], Raw<'_>> {
    map(
        (preceded(char('['), counted), opt(preceded(char('@'), number)), opt(preceded(char('#'), number))),
        |(term, pos, wqf)| Raw::Term { term, pos: pos.unwrap_or(0), wqf: wqf.unwrap_or(1) },
    )
    .parse(i)
}

fn compound(i: &[u8]) -> IResult<&[u8], Raw<'_>> {
    map((preceded(char('('), many0(raw_query)), op), |(subqs, op)| Raw::Compound { subqs, op }).parse(i)
}

fn value_query(i: &[u8]) -> IResult<&[u8], Raw<'_>> {
    alt((
        map((preceded(char(']'), slot), counted, counted), |(slot, lo, hi)| Raw::ValueRange { slot, lo, hi }),
        map((preceded(char('}'), slot), counted), |(slot, lo)| Raw::ValueGe { slot, lo }),
        map((preceded(char('{'), slot), counted), |(slot, hi)| Raw::ValueLe { slot, hi }),
    ))
    .parse(i)
}

fn external(i: &[u8]) -> IResult<&[u8], Raw<'_>> {
    map((preceded(char('!'), counted), counted), |(name, data)| Raw::External { name, data }).parse(i)
}

fn raw_query(i: &[u8]) -> IResult<&[u8], Raw<'_>> {
    alt((leaf, compound, value_query, external)).parse(i)
}

fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|_| Error::serialisation(format!("{} isn't valid UTF-8", what)))
}

fn build(raw: Raw<'_>, registry: &Registry) -> Result<Query> {
    Ok(match raw {
        Raw::Term { term, pos, wqf } => Query::term_at(utf8(term, "term")?, wqf, pos),
        Raw::Compound { subqs, op } => {
            let mut built = Vec::with_capacity(subqs.len());
            for q in subqs {
                built.push(build(q, registry)?);
            }
            match op {
                RawOp::Op(op, param) => Query::with_param(op, built, param)?,
                RawOp::Scale(factor) => {
                    if built.len() != 1 {
                        return Err(Error::serialisation("scale weight needs exactly one subquery"));
                    }
                    Query::scale_weight(factor, built.pop().unwrap_or_default())?
                }
            }
        }
        Raw::ValueRange { slot, lo, hi } => Query::ValueRange { slot, lo: lo.to_vec(), hi: hi.to_vec() },
        Raw::ValueGe { slot, lo } => Query::ValueGe { slot, lo: lo.to_vec() },
        Raw::ValueLe { slot, hi } => Query::ValueLe { slot, hi: hi.to_vec() },
        Raw::External { name, data } => Query::external(registry.unserialise_source(utf8(name, "source name")?, data)?),
    })
}

/// Rebuild a query from `serialise` output. Posting sources are looked up
/// by name in `registry`.
pub fn unserialise(data: &[u8], registry: &Registry) -> Result<Query> {
    if data.is_empty() {
        return Ok(Query::MatchNothing);
    }
    let (_, raw) = all_consuming(raw_query)
        .parse(data)
        .map_err(|e| Error::serialisation(format!("bad serialised query: {:?}", e.map_input(|i| i.len()))))?;
    build(raw, registry)
}

impl Query {
    pub fn serialise(&self) -> Vec<u8> {
        serialise(self)
    }

    pub fn unserialise(data: &[u8], registry: &Registry) -> Result<Query> {
        unserialise(data, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::source::{FixedWeightPostingSource, ValueWeightPostingSource};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn round_trip(q: &Query) -> Vec<u8> {
        let registry = Registry::default();
        let data = serialise(q);
        let back = unserialise(&data, &registry).unwrap();
        assert_eq!(&back, q);
        let again = serialise(&back);
        assert_eq!(again, data);
        data
    }

    #[test]
    fn phrase_round_trips() {
        let q = Query::with_param(Op::Phrase, [Query::term("fox"), Query::term("jumps")], 2).unwrap();
        assert_eq!(round_trip(&q), b"([3:fox[5:jumps\"2".to_vec());
    }

    #[test]
    fn leaves_and_specials() {
        assert_eq!(round_trip(&Query::MatchNothing), b"".to_vec());
        assert_eq!(round_trip(&Query::match_all()), b"[0:".to_vec());
        assert_eq!(round_trip(&Query::term_at("caf\u{e9}", 3, 7)), "[5:caf\u{e9}@7#3".as_bytes().to_vec());
    }

    #[test]
    fn everything_at_once() {
        let near = Query::with_param(Op::Near, [Query::term("a"), Query::term("b")], 4).unwrap();
        let syn = Query::new(Op::Synonym, [Query::term("car"), Query::term("auto")]).unwrap();
        let scaled = Query::scale_weight(0.25, syn).unwrap();
        let values = Query::new(
            Op::Or,
            [
                Query::value_range(1, "a", "m"),
                Query::value_ge(2, b"\x00:\xff".to_vec()),
                Query::value_le(3, "z"),
            ],
        )
        .unwrap();
        let filtered = Query::new(Op::Filter, [scaled, values]).unwrap();
        let src = Query::external(Box::new(ValueWeightPostingSource::new(9)));
        let maybe = Query::new(Op::AndMaybe, [near, src]).unwrap();
        let not = Query::new(Op::AndNot, [maybe, Query::term("x")]).unwrap();
        let q = Query::new(Op::Xor, [not, filtered, Query::new(Op::Max, [Query::term("p"), Query::term("q")]).unwrap()])
            .unwrap();
        round_trip(&q);
    }

    #[test]
    fn garbage_is_rejected() {
        let registry = Registry::default();
        for bad in [&b"[3:ab"[..], b"(", b"([1:a?", b"[1:a]", b"!3:zzz0:"] {
            assert!(unserialise(bad, &registry).is_err(), "{:?}", bad);
        }
    }

    const OPS: [Op; 11] = [
        Op::And, Op::Or, Op::AndNot, Op::Xor, Op::AndMaybe, Op::Filter, Op::Near, Op::Phrase, Op::EliteSet,
        Op::Synonym, Op::Max,
    ];

    fn random_query(rng: &mut StdRng, depth: u32) -> Query {
        let words = ["a", "b", "c", "", "d\0e"];
        let pick = rng.gen_range(0..if depth == 0 { 5 } else { 9 });
        match pick {
            0 | 1 => Query::term_at(words[rng.gen_range(0..words.len())], rng.gen_range(0..3), rng.gen_range(0..3)),
            2 => match rng.gen_range(0..3) {
                0 => Query::value_range(rng.gen_range(0..3), "b", "k"),
                1 => Query::value_ge(rng.gen_range(0..3), "c"),
                _ => Query::value_le(rng.gen_range(0..3), ""),
            },
            3 => {
                if rng.gen_bool(0.5) {
                    Query::MatchNothing
                } else {
                    Query::external(Box::new(FixedWeightPostingSource::new(rng.gen_range(0..4) as f64 * 0.75)))
                }
            }
            4 => {
                let subq = random_query(rng, depth.saturating_sub(1));
                Query::scale_weight(rng.gen_range(0..5) as f64 / 4.0, subq).unwrap_or_default()
            }
            _ => {
                let op = OPS[rng.gen_range(0..OPS.len())];
                let n = if matches!(op, Op::AndNot | Op::AndMaybe) { 2 } else { rng.gen_range(0..5) };
                let subqs: Vec<Query> = (0..n).map(|_| random_query(rng, depth - 1)).collect();
                Query::with_param(op, subqs, rng.gen_range(0..4)).unwrap_or_else(|_| Query::term("x"))
            }
        }
    }

    #[test]
    fn random_trees_round_trip() {
        let registry = Registry::default();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..2_000 {
            let q = random_query(&mut rng, 3);
            let data = serialise(&q);
            let back = unserialise(&data, &registry).unwrap_or_else(|e| panic!("{} from {:?}: {}", q, data, e));
            assert_eq!(back, q, "{:?}", String::from_utf8_lossy(&data));
            assert_eq!(serialise(&back), data, "{}", q);
        }
    }
}
