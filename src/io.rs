use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::bail;
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, one_of, space0},
    combinator::{eof, map_res, recognize},
    multi::{many0, many1, separated_list1},
    number::complete::double,
    sequence::{delimited, terminated, tuple},
    IResult, Parser,
};

use crate::base::Graph;
use crate::order::OrderingSpecifier;

pub fn token<'a>(i: &'a str) -> impl Fn(&'a str) -> IResult<&'a str, &'a str> {
    tag_no_case(i)
}

pub fn decimal(input: &str) -> IResult<&str, &str> {
    recognize(many1(terminated(one_of("0123456789"), many0(char('_')))))(input)
}

fn seed(input: &str) -> IResult<&str, u64> {
    map_res(decimal, |d: &str| d.replace('_', "").parse::<u64>())(input)
}

/// `identity`, `shuffle` or `shuffle:<seed>`.
pub fn parse_ordering_specifier(s: &str) -> Result<OrderingSpecifier, String> {
    if s.is_empty() {
        return Err("Empty ordering specifier".to_string());
    }
    let mut ps = alt((
        tuple((token("shuffle"), token(":"), seed))
            .map(|(_, _, seed)| OrderingSpecifier::Shuffle(Some(seed))),
        token("shuffle").map(|_| OrderingSpecifier::Shuffle(None)),
        token("identity").map(|_| OrderingSpecifier::Identity),
    ));
    let (rest, spec) = ps(s).map_err(|e| format!("Failed to parse ordering specifier: {}", e))?;
    if !rest.is_empty() {
        return Err(format!("Failed to parse ordering specifier: {}", rest));
    }
    Ok(spec)
}

/// Comma separated split penalties, e.g. `1.5,2,3`.
pub fn parse_penalty_list(s: &str) -> Result<Vec<f64>, String> {
    let parsed: IResult<&str, Vec<f64>> = terminated(
        separated_list1(delimited(space0, char(','), space0), double),
        eof,
    )(s.trim());
    let (_, penalties) = parsed.map_err(|e| format!("Failed to parse penalty list: {}", e))?;
    Ok(penalties)
}

/// Reads a `node<TAB>cid` clustering (or `cid<TAB>node` when `legacy_order`)
/// into overlapping communities of internal ids, keyed by cid.
pub fn read_clustering_from_reader<R: BufRead>(
    graph: &Graph,
    reader: R,
    legacy_order: bool,
) -> anyhow::Result<BTreeMap<usize, BTreeSet<usize>>> {
    let mut clusters: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let first = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing node on line {}", lineno + 1))?;
        let second = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing cluster id on line {}", lineno + 1))?;
        let (node_name, cluster_name) = if legacy_order {
            (second, first)
        } else {
            (first, second)
        };
        let cid = cluster_name
            .parse::<usize>()
            .map_err(|_| anyhow::anyhow!("invalid cluster id on line {}", lineno + 1))?;
        match graph.retrieve(node_name) {
            Some(node) => {
                clusters.entry(cid).or_default().insert(node);
            }
            None => bail!("node {} in cluster {} not found in graph", node_name, cid),
        }
    }
    Ok(clusters)
}

pub fn read_clustering<P>(
    graph: &Graph,
    path: P,
    legacy_order: bool,
) -> anyhow::Result<BTreeMap<usize, BTreeSet<usize>>>
where
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    read_clustering_from_reader(graph, BufReader::new(file), legacy_order)
}

/// Writes one line per membership; cids follow the order of `communities`.
pub fn write_communities_raw<W: Write>(
    mut writer: W,
    communities: &[BTreeSet<String>],
    legacy_order: bool,
) -> anyhow::Result<()> {
    for (cid, community) in communities.iter().enumerate() {
        for node in community {
            if legacy_order {
                writeln!(writer, "{}\t{}", cid, node)?;
            } else {
                writeln!(writer, "{}\t{}", node, cid)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_communities<P: AsRef<Path>>(
    path: P,
    communities: &[BTreeSet<String>],
    legacy_order: bool,
) -> anyhow::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    write_communities_raw(writer, communities, legacy_order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_parse_ordering_specifier() {
        assert_eq!(
            parse_ordering_specifier("identity"),
            Ok(OrderingSpecifier::Identity)
        );
        assert_eq!(
            parse_ordering_specifier("shuffle"),
            Ok(OrderingSpecifier::Shuffle(None))
        );
        assert_eq!(
            parse_ordering_specifier("Shuffle:1_000"),
            Ok(OrderingSpecifier::Shuffle(Some(1000)))
        );
        assert!(parse_ordering_specifier("shuffle:").is_err());
        assert!(parse_ordering_specifier("random").is_err());
        assert!(parse_ordering_specifier("").is_err());
    }

    #[test]
    pub fn test_parse_penalty_list() {
        assert_eq!(parse_penalty_list("1.5,2,3"), Ok(vec![1.5, 2.0, 3.0]));
        assert_eq!(parse_penalty_list("2.5"), Ok(vec![2.5]));
        assert_eq!(parse_penalty_list("1.5, 4"), Ok(vec![1.5, 4.0]));
        assert!(parse_penalty_list("1.5,,2").is_err());
        assert!(parse_penalty_list("abc").is_err());
    }

    #[test]
    pub fn clustering_round_trip_keeps_overlap() -> anyhow::Result<()> {
        let graph = Graph::parse_edgelist_from_str("a b\nb c\n")?;
        let communities: Vec<BTreeSet<String>> = vec![
            ["a", "b"].iter().map(|s| s.to_string()).collect(),
            ["b", "c"].iter().map(|s| s.to_string()).collect(),
        ];
        for legacy in [false, true] {
            let mut buf = Vec::new();
            write_communities_raw(&mut buf, &communities, legacy)?;
            let clusters = read_clustering_from_reader(&graph, buf.as_slice(), legacy)?;
            assert_eq!(2, clusters.len());
            let b = graph.retrieve("b").unwrap();
            assert!(clusters.values().all(|c| c.contains(&b)));
        }
        let text = String::from_utf8({
            let mut buf = Vec::new();
            write_communities_raw(&mut buf, &communities[..1], false)?;
            buf
        })?;
        assert_eq!("a\t0\nb\t0\n", text);
        Ok(())
    }

    #[test]
    pub fn unknown_nodes_are_rejected() -> anyhow::Result<()> {
        let graph = Graph::parse_edgelist_from_str("a b\n")?;
        assert!(read_clustering_from_reader(&graph, "z\t0\n".as_bytes(), false).is_err());
        assert!(read_clustering_from_reader(&graph, "a\tx\n".as_bytes(), false).is_err());
        Ok(())
    }
}
