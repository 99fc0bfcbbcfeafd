mod json_io;

use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;
use yomi_renbun::{Catalog, GrammarTable, PermanentBuilder, PermanentDic, Permission, RkError, WordRecord};

use crate::json_io::RecordSerde;

const BLUE: &str = "\x1B[1;34m"; // Bold Blue
const RESET: &str = "\x1B[0m"; // Reset color

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn cli() -> Command {
    Command::new("dict-build")
        .about(format!(
            "{BLUE}Dict Build: compile, dump and register yomi-renbun dictionaries{RESET}"
        ))
        .subcommand_required(true)
        .after_help(
            "Examples:\n\
         \n\
         dict-build grammar grammar.txt -o grammar.cbp\n\
         dict-build compile words.txt --member iroha.mwd --grammar grammar.cbp -o iroha.cbd\n\
         dict-build register dic/ iroha.cbd iroha.mwd iroha\n\
         dict-build dump iroha.cbd --member iroha.mwd --format json --pretty\n",
        )
        .subcommand(
            Command::new("compile")
                .about("Build a permanent dictionary member from word lines")
                .arg(Arg::new("input").required(true).value_name("file"))
                .arg(
                    Arg::new("member")
                        .short('m')
                        .long("member")
                        .required(true)
                        .value_name("name")
                        .help("Member name, e.g. iroha.mwd (the extension selects the word class)"),
                )
                .arg(output_arg())
                .arg(grammar_arg())
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .default_value("text")
                        .value_parser(["text", "json"])
                        .help("Input format: [text|json]"),
                )
                .arg(
                    Arg::new("comment")
                        .long("comment")
                        .value_name("text")
                        .help("Comment stored in the member header"),
                )
                .arg(
                    Arg::new("append")
                        .long("append")
                        .action(ArgAction::SetTrue)
                        .help("Append the member to an existing dictionary file"),
                ),
        )
        .subcommand(
            Command::new("grammar")
                .about("Compile a grammar source into a .cbp grammar file")
                .arg(Arg::new("input").required(true).value_name("file"))
                .arg(output_arg())
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .default_value("cbp")
                        .value_parser(["cbp", "source", "json"])
                        .help("Output format: [cbp|source|json]"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Print every word of a permanent dictionary member")
                .arg(Arg::new("input").required(true).value_name("file"))
                .arg(
                    Arg::new("member")
                        .short('m')
                        .long("member")
                        .required(true)
                        .value_name("name"),
                )
                .arg(output_arg())
                .arg(grammar_arg())
                .arg(
                    Arg::new("format")
                        .short('f')
                        .long("format")
                        .default_value("text")
                        .value_parser(["text", "json"])
                        .help("Output format: [text|json]"),
                )
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .action(ArgAction::SetTrue)
                        .help("Pretty-print JSON when --format json"),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Add a member line to a directory's dics.dir")
                .arg(Arg::new("dir").required(true).value_name("directory"))
                .arg(Arg::new("link").required(true).value_name("file"))
                .arg(Arg::new("member").required(true).value_name("member"))
                .arg(Arg::new("nickname").required(true).value_name("nickname"))
                .arg(
                    Arg::new("perm")
                        .long("perm")
                        .default_value("-r--")
                        .allow_hyphen_values(true)
                        .value_parser(["-rw-", "-r--", "--w-", "----"])
                        .help("Member permission"),
                ),
        )
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("filename")
        .help("Write to <filename> instead of the default")
}

fn grammar_arg() -> Arg {
    Arg::new("grammar")
        .short('g')
        .long("grammar")
        .value_name("file")
        .help("Grammar file (.cbp) or grammar source; the built-in grammar when absent")
}

fn load_grammar(path: Option<&String>) -> CliResult<Arc<GrammarTable>> {
    let Some(path) = path else {
        return Ok(GrammarTable::builtin());
    };
    let grammar = if path.ends_with(".cbp") {
        GrammarTable::load_compressed(path)?
    } else {
        GrammarTable::from_source(&fs::read_to_string(path)?)?
    };
    Ok(Arc::new(grammar))
}

fn grammar_name(path: Option<&String>) -> Option<String> {
    let stem = Path::new(path?).file_stem()?.to_str()?;
    Some(format!("{stem}.gram"))
}

fn open_output(path: &str) -> io::Result<Box<dyn Write>> {
    Ok(if path == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        Box::new(BufWriter::new(fs::File::create(path)?))
    })
}

/// Parses word lines in parallel; lines that do not parse are reported and
/// skipped.
fn parse_text(text: &str, grammar: &GrammarTable) -> Vec<WordRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let parsed: Vec<(usize, Result<Option<WordRecord>, RkError>)> = lines
        .par_iter()
        .enumerate()
        .map(|(i, line)| (i, WordRecord::parse_text(line, grammar)))
        .collect();
    let mut records = Vec::with_capacity(parsed.len());
    for (i, result) in parsed {
        match result {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => tracing::warn!("line {}: {err}", i + 1),
        }
    }
    records
}

fn parse_json(text: &str, grammar: &GrammarTable) -> CliResult<Vec<WordRecord>> {
    let dto: Vec<RecordSerde> = serde_json::from_str(text)?;
    let records = dto
        .into_iter()
        .map(|r| r.into_internal(grammar))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn compile(m: &ArgMatches) -> CliResult<()> {
    let input = m.get_one::<String>("input").map(String::as_str).unwrap_or_default();
    let member = m.get_one::<String>("member").map(String::as_str).unwrap_or_default();
    let grammar_path = m.get_one::<String>("grammar");
    let grammar = load_grammar(grammar_path)?;

    let text = fs::read_to_string(input)?;
    let records = match m.get_one::<String>("format").map(String::as_str) {
        Some("json") => parse_json(&text, &grammar)?,
        _ => parse_text(&text, &grammar),
    };

    let mut builder = PermanentBuilder::new(member);
    if let Some(name) = grammar_name(grammar_path) {
        builder = builder.grammar(&name);
    }
    if let Some(comment) = m.get_one::<String>("comment") {
        builder = builder.comment(comment);
    }
    let words = records.len();
    for record in records {
        builder.add(record)?;
    }
    let image = builder.build()?;

    let default_output = format!(
        "{}.cbd",
        Path::new(member).file_stem().and_then(|s| s.to_str()).unwrap_or("dictionary")
    );
    let output = m.get_one::<String>("output").cloned().unwrap_or(default_output);
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(m.get_flag("append"))
        .truncate(!m.get_flag("append"))
        .open(&output)?;
    file.write_all(&image)?;
    eprintln!(
        "{BLUE}{words} words ({} readings) compiled into {output}({member}){RESET}",
        builder.len()
    );
    Ok(())
}

fn grammar(m: &ArgMatches) -> CliResult<()> {
    let input = m.get_one::<String>("input").map(String::as_str).unwrap_or_default();
    let table = GrammarTable::from_source(&fs::read_to_string(input)?)?;
    let format = m.get_one::<String>("format").map(String::as_str).unwrap_or("cbp");
    let default_output = match format {
        "json" => "grammar.json",
        "source" => "-",
        _ => "grammar.cbp",
    };
    let output = m
        .get_one::<String>("output")
        .map(String::as_str)
        .unwrap_or(default_output);
    match format {
        "json" => {
            let mut w = open_output(output)?;
            serde_json::to_writer_pretty(&mut w, &table)?;
            w.write_all(b"\n")?;
            w.flush()?;
        }
        "source" => {
            let mut w = open_output(output)?;
            w.write_all(table.to_source().as_bytes())?;
            w.flush()?;
        }
        _ => table.save_compressed(output)?,
    }
    eprintln!("{BLUE}Grammar with {} rows saved at: {output}{RESET}", table.rows());
    Ok(())
}

fn dump(m: &ArgMatches) -> CliResult<()> {
    let input = m.get_one::<String>("input").map(String::as_str).unwrap_or_default();
    let member = m.get_one::<String>("member").map(String::as_str).unwrap_or_default();
    let grammar = load_grammar(m.get_one::<String>("grammar"))?;
    let mut dic = PermanentDic::open(input, member, 8)?;
    let entries = dic.dump()?;
    let output = m.get_one::<String>("output").map(String::as_str).unwrap_or("-");
    let mut w = open_output(output)?;
    match m.get_one::<String>("format").map(String::as_str) {
        Some("json") => {
            let dto: Vec<RecordSerde> = entries
                .iter()
                .map(|e| RecordSerde::from_record(&e.record, &grammar, Some(e.ordinal)))
                .collect();
            if m.get_flag("pretty") {
                serde_json::to_writer_pretty(&mut w, &dto)?;
            } else {
                serde_json::to_writer(&mut w, &dto)?;
            }
            // newline for POSIX-y tools
            w.write_all(b"\n")?;
        }
        _ => {
            for e in &entries {
                writeln!(w, "{}", e.record.to_text(&grammar))?;
            }
        }
    }
    w.flush()?;
    eprintln!("{BLUE}{} records dumped from {input}({member}){RESET}", entries.len());
    Ok(())
}

fn register(m: &ArgMatches) -> CliResult<()> {
    let arg = |name: &str| m.get_one::<String>(name).map(String::as_str).unwrap_or_default();
    let perm = Permission::parse(arg("perm")).unwrap_or(Permission::READ_ONLY);
    let mut catalog = Catalog::new();
    let dir = catalog.open_directory(arg("dir"))?;
    catalog.create_member(dir, arg("link"), arg("member"), arg("nickname"), perm)?;
    eprintln!(
        "{BLUE}Registered {}({}) as {} {perm}{RESET}",
        arg("link"),
        arg("member"),
        arg("nickname")
    );
    Ok(())
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match cli().get_matches().subcommand() {
        Some(("compile", m)) => compile(m),
        Some(("grammar", m)) => grammar(m),
        Some(("dump", m)) => dump(m),
        Some(("register", m)) => register(m),
        _ => Ok(()),
    }
}
