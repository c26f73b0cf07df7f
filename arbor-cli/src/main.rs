// File: arbor-cli/src/main.rs
use anyhow::{bail, ensure, Context, Result};
use arbor_abi::{encode_leaf, parse_descriptor, parse_value, AbiError, Address, LeafEncoding};
use arbor_config::Settings;
use arbor_hash::Digest;
use arbor_merkle::{verify_leaf, Proof};
use arbor_service::{CreateTree, ProofQuery, Service};
use clap::{ArgGroup, Parser, Subcommand};
use std::{fs, path::{Path, PathBuf}};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "arbor", version, about = "Sorted-pair Keccak Merkle trees and proofs")]
struct Cli {
    /// Settings file (toml); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Build and store a tree, print its root
    Create {
        /// Leaves as hex
        leaves: Vec<String>,
        /// Read leaves from a file, one hex leaf per line
        #[arg(long)]
        file: Option<PathBuf>,
        /// Leaf field types, comma separated (e.g. address,uint96)
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        /// Leaves are abi.encode'd rather than packed
        #[arg(long)]
        padded: bool,
    },
    /// Print a stored tree as json
    Tree { root: String },
    /// Print the proof for one leaf of a stored tree
    #[command(group(ArgGroup::new("target").required(true).args(["leaf", "address"])))]
    Proof {
        root: String,
        #[arg(long)]
        leaf: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Recompute the root a proof commits to. Without --leaf the stored
    /// trees are searched for one containing the proof.
    RootFromProof {
        #[arg(long)]
        leaf: Option<String>,
        /// Sibling digests, leaf to root
        #[arg(required = true)]
        proof: Vec<String>,
    },
    /// Check a proof against a root
    Verify {
        #[arg(long)]
        root: String,
        #[arg(long)]
        leaf: String,
        proof: Vec<String>,
    },
    /// Encode typed values into leaf bytes
    Encode {
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<String>,
        #[arg(long)]
        padded: bool,
        values: Vec<String>,
    },
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let t = s.trim();
    let t = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")).unwrap_or(t);
    hex::decode(t).with_context(|| format!("invalid hex {s:?}"))
}

fn parse_root(s: &str) -> Result<Digest> {
    s.parse().with_context(|| format!("invalid root {s:?}"))
}

fn read_leaves(path: &Path) -> Result<Vec<Vec<u8>>> {
    let txt = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    txt.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_hex)
        .collect()
}

fn encoding(padded: bool) -> LeafEncoding {
    if padded {
        LeafEncoding::Padded
    } else {
        LeafEncoding::Packed
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(p) => Settings::from_file(p).with_context(|| format!("loading {}", p.display()))?,
        None => Settings::default(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(settings.log.effective_filter()).context("log filter")?)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Cmd::Create { leaves, file, types, padded } => {
            let mut raw = leaves.iter().map(|l| parse_hex(l)).collect::<Result<Vec<_>>>()?;
            if let Some(f) = file {
                raw.extend(read_leaves(&f)?);
            }
            ensure!(!raw.is_empty(), "no leaves given");
            let leaf_types =
                if types.is_empty() { None } else { Some(parse_descriptor(types.as_slice())?) };
            let req =
                CreateTree { leaf_types, packed: padded.then_some(false), ..CreateTree::new(raw) };
            let root = Service::from_settings(&settings)?.create_tree(req)?;
            println!("{root}");
        }
        Cmd::Tree { root } => {
            let view = Service::from_settings(&settings)?.get_tree(&parse_root(&root)?)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Cmd::Proof { root, leaf, address } => {
            let query = match (leaf, address) {
                (Some(l), _) => ProofQuery::ByLeaf(parse_hex(&l)?),
                (None, Some(a)) => ProofQuery::ByAddress(a.parse::<Address>()?),
                (None, None) => bail!("one of --leaf or --address is required"),
            };
            let lp = Service::from_settings(&settings)?.get_proof(&parse_root(&root)?, &query)?;
            println!("{}", serde_json::to_string_pretty(&lp)?);
        }
        Cmd::RootFromProof { leaf, proof } => {
            let proof = Proof::from_hex(proof.as_slice())?;
            let root = match leaf {
                Some(l) => Service::root_from_proof(&parse_hex(&l)?, &proof),
                None => Service::from_settings(&settings)?.find_root(&proof)?,
            };
            println!("{root}");
        }
        Cmd::Verify { root, leaf, proof } => {
            let proof = Proof::from_hex(proof.as_slice())?;
            let ok = verify_leaf(&parse_hex(&leaf)?, &proof, &parse_root(&root)?);
            println!("{}", if ok { "valid" } else { "invalid" });
            if !ok {
                std::process::exit(1);
            }
        }
        Cmd::Encode { types, padded, values } => {
            let types = parse_descriptor(types.as_slice())?;
            ensure!(
                types.len() == values.len(),
                AbiError::Arity { expected: types.len(), got: values.len() }
            );
            let values = types
                .iter()
                .zip(&values)
                .map(|(t, v)| parse_value(t, v))
                .collect::<Result<Vec<_>, _>>()?;
            println!("0x{}", hex::encode(encode_leaf(&types, &values, encoding(padded))?));
        }
    }
    Ok(())
}
