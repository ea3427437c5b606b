// provgraph CLI - create, link, validate and export provenance manifests
//
// Results go to stdout (ids, JSON, encoded manifests); status lines and logs
// go to stderr. Exit code 1 means the command failed, 2 means it ran but the
// validation or link check did not pass.

mod formats;
mod keystore;
mod metadata;
mod render;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use provgraph_core::{
    build, export, history, link, validate, validate_graph, verify_link, BuildRequest,
    HashAlgorithm, IngredientSpec, LinkOptions, LinkPolicy, ListFilter, ManifestId, ManifestKind,
    ManifestMetadata, ManifestStore, SigningSecret, StorageConfig, ValidationOptions,
};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::formats::{GraphFormat, ManifestFormat};

const DEFAULT_DATABASE_URL: &str = "http://localhost:8080";
const DEFAULT_MAX_DEPTH: usize = 10;

/// provgraph - provenance manifests for machine-learning artifacts
#[derive(Parser)]
#[command(name = "provgraph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Storage backend: local-fs, database, transparency-log or memory
    #[arg(long, global = true, env = "PROVGRAPH_STORAGE_TYPE", default_value = "database")]
    storage_type: String,

    /// Directory (local-fs, transparency-log) or base URL (database)
    #[arg(long, global = true, env = "PROVGRAPH_STORAGE_URL")]
    storage_url: Option<String>,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a manifest over one or more artifacts
    Create {
        /// dataset, model, software or evaluation
        #[arg(long)]
        kind: ManifestKind,

        /// Artifact files or directories (comma-separated)
        #[arg(long, num_args = 1.., value_delimiter = ',', required = true)]
        paths: Vec<PathBuf>,

        /// One name per path (comma-separated)
        #[arg(long, num_args = 1.., value_delimiter = ',', required = true)]
        ingredient_names: Vec<String>,

        #[arg(long, visible_alias = "name")]
        title: String,

        #[arg(long)]
        author_org: Option<String>,

        #[arg(long)]
        author_name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Annotation key=value pairs, dot-nested (repeatable)
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,

        /// Manifest to link to (repeatable)
        #[arg(long = "link", value_name = "ID")]
        links: Vec<ManifestId>,

        #[arg(long, value_name = "ID")]
        previous_version: Option<ManifestId>,

        /// Signing key (PKCS#8 PEM or hex seed, optionally age-encrypted)
        #[arg(long, env = "PROVGRAPH_KEY")]
        key: Option<PathBuf>,

        #[arg(long, env = "PROVGRAPH_HASH_ALG", default_value = "sha256")]
        hash_alg: HashAlgorithm,

        /// Write the encoded manifest to stdout
        #[arg(long)]
        print: bool,

        /// Format for --print: json, canonical-json, cbor, in-toto or dsse (needs --key)
        #[arg(long, default_value = "json")]
        format: ManifestFormat,

        /// Build (and sign) without storing
        #[arg(long)]
        no_store: bool,
    },
    /// Link a manifest to another, producing a new version of the source
    Link {
        #[arg(long)]
        source: ManifestId,

        #[arg(long)]
        target: ManifestId,

        /// Sign the new version with this key
        #[arg(long, env = "PROVGRAPH_KEY")]
        key: Option<PathBuf>,

        /// Accept a target that is not in the store yet
        #[arg(long)]
        lenient: bool,
    },
    /// Validate a manifest's content address, signature, ingredients and links
    Validate {
        #[arg(long)]
        id: ManifestId,

        /// Also validate every manifest reachable through links
        #[arg(long)]
        transitive: bool,

        /// Link depth for --transitive
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Fail unsigned manifests
        #[arg(long)]
        require_signature: bool,

        /// Accept only these did:key signers (repeatable)
        #[arg(long = "trusted-signer", value_name = "DID")]
        trusted_signers: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that a source links to a target that resolves
    VerifyLink {
        #[arg(long)]
        source: ManifestId,

        #[arg(long)]
        target: ManifestId,

        #[arg(long)]
        json: bool,
    },
    /// Export the provenance graph reachable from a manifest
    Export {
        #[arg(long)]
        id: ManifestId,

        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        #[arg(long, value_enum, default_value_t = GraphFormat::Json)]
        format: GraphFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List stored manifest ids
    List {
        #[arg(long)]
        kind: Option<ManifestKind>,
    },
    /// Print a stored manifest
    Show {
        #[arg(long)]
        id: ManifestId,

        /// json, canonical-json, cbor, in-toto or dsse (needs --key)
        #[arg(long, default_value = "json")]
        format: ManifestFormat,

        /// Key for signing --format dsse envelopes
        #[arg(long, env = "PROVGRAPH_KEY")]
        key: Option<PathBuf>,
    },
    /// Check a DSSE envelope: signatures, statement and content address
    VerifyEnvelope {
        /// Envelope JSON file
        #[arg(long)]
        input: PathBuf,

        /// Accept only these did:key signers (repeatable)
        #[arg(long = "trusted-signer", value_name = "DID")]
        trusted_signers: Vec<String>,

        #[arg(long)]
        json: bool,
    },
    /// Show the version history of a manifest
    History {
        #[arg(long)]
        id: ManifestId,

        #[arg(long)]
        json: bool,
    },
    /// Generate an Ed25519 signing key
    Keygen {
        /// Where to write the PKCS#8 PEM key
        #[arg(short, long)]
        output: PathBuf,

        /// Encrypt the key file with a passphrase
        #[arg(long)]
        encrypt: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Runs one command. `Ok(false)` means a check ran and did not pass.
fn run(cli: Cli) -> Result<bool> {
    if let Commands::Keygen { output, encrypt } = &cli.command {
        return handle_keygen(output, *encrypt);
    }
    if let Commands::VerifyEnvelope {
        input,
        trusted_signers,
        json,
    } = &cli.command
    {
        return handle_verify_envelope(input, trusted_signers, *json);
    }

    let store = open_store(&cli.storage_type, cli.storage_url.as_deref())?;
    let store = store.as_ref();

    match cli.command {
        Commands::Create {
            kind,
            paths,
            ingredient_names,
            title,
            author_org,
            author_name,
            description,
            meta,
            links,
            previous_version,
            key,
            hash_alg,
            print,
            format,
            no_store,
        } => {
            if paths.len() != ingredient_names.len() {
                bail!(
                    "--paths has {} entries but --ingredient-names has {}",
                    paths.len(),
                    ingredient_names.len()
                );
            }

            let metadata = ManifestMetadata {
                title,
                author_org,
                author_name,
                description,
                annotations: metadata::parse_annotations(&meta)?,
            };
            let mut request = BuildRequest::new(kind, metadata);
            for (name, path) in ingredient_names.into_iter().zip(paths) {
                request = request.ingredient(IngredientSpec::new(name, path).with_algorithm(hash_alg));
            }
            for target in links {
                request = request.link(target);
            }
            if let Some(previous) = previous_version {
                request = request.previous_version(previous);
            }

            let signer = load_signer(key.as_deref())?;
            if print && format.needs_signer() && signer.is_none() {
                bail!("--format dsse requires a signing key (--key)");
            }
            handle_create(request, signer.as_ref(), store, print.then_some(format), no_store)
        }
        Commands::Link {
            source,
            target,
            key,
            lenient,
        } => {
            let signer = load_signer(key.as_deref())?;
            let options = LinkOptions {
                policy: if lenient {
                    LinkPolicy::Lenient
                } else {
                    LinkPolicy::Strict
                },
                signer: signer.as_ref(),
            };
            let new_id = link(&source, &target, store, &options)?;

            eprintln!("{} Linked {} -> {}", "✓".green().bold(), source, target);
            println!("{}", new_id);
            Ok(true)
        }
        Commands::Validate {
            id,
            transitive,
            max_depth,
            require_signature,
            trusted_signers,
            json,
        } => {
            let options = ValidationOptions {
                require_signature,
                trusted_signers,
            };
            if transitive {
                let outcome = validate_graph(&id, max_depth, store, &options)?;
                if json {
                    print_json(&outcome)?;
                } else {
                    render::graph_validation(&outcome);
                }
                Ok(outcome.passed())
            } else {
                let report = validate(&id, store, &options)?;
                if json {
                    print_json(&report)?;
                } else {
                    render::report(&report);
                }
                Ok(report.passed())
            }
        }
        Commands::VerifyLink {
            source,
            target,
            json,
        } => {
            let outcome = verify_link(&source, &target, store)?;
            if json {
                print_json(&outcome)?;
            } else {
                render::link_verification(&source, &target, &outcome);
            }
            Ok(outcome.valid)
        }
        Commands::Export {
            id,
            max_depth,
            format,
            output,
        } => {
            let graph = export(&id, max_depth, store)?;
            let rendered = formats::render_graph(&graph, format)?;
            match output {
                Some(path) => {
                    fs::write(&path, rendered.as_bytes())
                        .with_context(|| format!("Failed to write '{}'", path.display()))?;
                    eprintln!(
                        "{} Exported {} manifests ({} edges) to {}",
                        "✓".green().bold(),
                        graph.nodes.len(),
                        graph.edges.len(),
                        path.display()
                    );
                }
                None => write_stdout(rendered.as_bytes())?,
            }
            if graph.truncated {
                eprintln!("{} depth limit {} reached; graph truncated", "!".yellow().bold(), max_depth);
            }
            Ok(true)
        }
        Commands::List { kind } => {
            let filter = ListFilter { kind };
            for id in store.list(&filter)? {
                println!("{}", id);
            }
            Ok(true)
        }
        Commands::Show { id, format, key } => {
            let manifest = store.get(&id)?;
            let signer = if format.needs_signer() {
                load_signer(key.as_deref())?
            } else {
                None
            };
            write_stdout(&format.render(&manifest, signer.as_ref())?)?;
            Ok(true)
        }
        Commands::History { id, json } => {
            let versions = history(&id, store)?;
            if json {
                let ids: Vec<&ManifestId> = versions.iter().map(|m| &m.id).collect();
                print_json(&ids)?;
            } else {
                render::history(&versions);
            }
            Ok(true)
        }
        Commands::Keygen { .. } | Commands::VerifyEnvelope { .. } => Ok(true),
    }
}

fn handle_create(
    request: BuildRequest,
    signer: Option<&SigningSecret>,
    store: &dyn ManifestStore,
    print: Option<ManifestFormat>,
    no_store: bool,
) -> Result<bool> {
    let manifest = build(request, signer)?;

    if let Some(format) = print {
        write_stdout(&format.render(&manifest, signer)?)?;
    }

    if no_store {
        eprintln!(
            "{} Built {} manifest {} (not stored)",
            "✓".green().bold(),
            manifest.kind(),
            manifest.id
        );
        if print.is_none() {
            println!("{}", manifest.id);
        }
        return Ok(true);
    }

    let id = store.put(&manifest)?;
    eprintln!(
        "{} Created {} manifest{}",
        "✓".green().bold(),
        manifest.kind(),
        if manifest.signature.is_some() { " (signed)" } else { "" }
    );
    if print.is_none() {
        println!("{}", id);
    }
    Ok(true)
}

fn handle_keygen(output: &Path, encrypt: bool) -> Result<bool> {
    let (signing_key, verifying_key) = provgraph_crypto::generate_keypair();
    keystore::write_signing_key(output, &signing_key, encrypt)?;

    eprintln!(
        "{} Wrote {}signing key to {}",
        "✓".green().bold(),
        if encrypt { "encrypted " } else { "" },
        output.display()
    );
    println!("{}", provgraph_crypto::public_key_fingerprint(&verifying_key));
    Ok(true)
}

fn handle_verify_envelope(input: &Path, trusted_signers: &[String], json: bool) -> Result<bool> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read '{}'", input.display()))?;
    let check = formats::check_envelope(&bytes, trusted_signers)?;
    if json {
        print_json(&check)?;
    } else {
        render::envelope(&check);
    }
    Ok(check.valid)
}

fn open_store(kind: &str, location: Option<&str>) -> Result<Box<dyn ManifestStore>> {
    let location = match (kind.trim().to_ascii_lowercase().as_str(), location) {
        ("database" | "db", None) => Some(DEFAULT_DATABASE_URL),
        (_, location) => location,
    };
    let config = StorageConfig::from_parts(kind, location)?;
    let store = provgraph_core::open(&config)?;
    debug!(store = %store.describe(), "Opened manifest store");
    Ok(store)
}

fn load_signer(key: Option<&Path>) -> Result<Option<SigningSecret>> {
    if let Some(path) = key {
        debug!(path = %path.display(), "Loading signing key");
    }
    key.map(keystore::load_signing_secret).transpose()
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(bytes)?;
    if bytes.last() != Some(&b'\n') && std::str::from_utf8(bytes).is_ok() {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
