use std::fs::File;
use std::io::{self, BufReader, BufWriter, IsTerminal, Read, Write};

use clap::{Arg, ArgAction, Command};
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use tracing_subscriber::EnvFilter;
use yomi_renbun::{ContextId, ConversionMode, Engine, EngineConfig, MemberKind, RkResult};

const BLUE: &str = "\x1B[1;34m";
const RESET: &str = "\x1B[0m";

fn read_input(input: &mut dyn Read, is_console: bool) -> Result<Vec<u8>, io::Error> {
    let mut buffer = Vec::new();

    if is_console {
        // Read chunks of data when input is from the console
        let mut chunk = [0; 1024];
        while let Ok(bytes_read) = input.read(&mut chunk) {
            if bytes_read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..bytes_read]);
        }
    } else {
        input.read_to_end(&mut buffer)?;
    }

    Ok(buffer)
}

fn decode_input(buffer: &[u8], in_enc: &str) -> Result<String, io::Error> {
    match in_enc {
        "UTF-8" => Ok(String::from_utf8_lossy(remove_utf8_bom(buffer)).into_owned()),
        _ => {
            let encoding = Encoding::for_label(in_enc.as_bytes()).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Unsupported input encoding: {}", in_enc),
                )
            })?;
            let mut decoder = DecodeReaderBytesBuilder::new()
                .encoding(Some(encoding))
                .build(buffer);
            let mut decoded = String::new();
            decoder.read_to_string(&mut decoded)?;
            Ok(decoded)
        }
    }
}

fn remove_utf8_bom(input: &[u8]) -> &[u8] {
    input.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(input)
}

/// How each line is converted and printed.
struct Options {
    mode: ConversionMode,
    candidates: bool,
    learn: bool,
}

fn start(engine: &mut Engine, cx: ContextId, reading: &str, mode: ConversionMode) -> RkResult<usize> {
    match mode {
        ConversionMode::Renbun => engine.begin_conversion(cx, reading, mode),
        ConversionMode::Auto => {
            engine.begin_conversion(cx, "", mode)?;
            // Feed the reading as it would be typed.
            for (i, c) in reading.chars().enumerate() {
                engine.subst_yomi(cx, i, i, c.encode_utf8(&mut [0; 4]))?;
            }
            engine.flush_yomi(cx)
        }
    }
}

fn convert_line(
    engine: &mut Engine,
    cx: ContextId,
    line: &str,
    opts: &Options,
    out: &mut dyn Write,
) -> Result<(), Box<dyn std::error::Error>> {
    if line.trim().is_empty() {
        writeln!(out, "{line}")?;
        return Ok(());
    }
    let phrases = match start(engine, cx, line, opts.mode) {
        Ok(n) => n,
        Err(err) => {
            // A failed start can leave the conversion open.
            let _ = engine.end_conversion(cx, false);
            return Err(err.into());
        }
    };
    if opts.candidates {
        for i in 0..phrases {
            engine.goto_phrase(cx, i)?;
            let list = engine.kanji_list(cx)?;
            writeln!(out, "{}\t{}", engine.phrase_yomi(cx)?, list.join(" / "))?;
        }
    } else {
        let mut parts = Vec::with_capacity(phrases);
        for i in 0..phrases {
            engine.goto_phrase(cx, i)?;
            parts.push(engine.current_kanji(cx)?);
        }
        writeln!(out, "{}", parts.join(" "))?;
    }
    engine.end_conversion(cx, opts.learn)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("Renbun CLI")
        .about(format!(
            "{BLUE}Renbun CLI: convert kana readings into kanji phrases{RESET}"
        ))
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("file")
                .help("Read readings, one per line, from <file>."),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("file")
                .help("Write converted text to <file>."),
        )
        .arg(
            Arg::new("dic_dir")
                .short('d')
                .long("dic-dir")
                .value_name("directory")
                .action(ArgAction::Append)
                .help("Dictionary directory containing dics.dir; may be repeated."),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("file")
                .help("Engine configuration (JSON)."),
        )
        .arg(
            Arg::new("mount")
                .short('m')
                .long("mount")
                .value_name("nickname")
                .action(ArgAction::Append)
                .help("Dictionary to mount; every dictionary on the path when absent."),
        )
        .arg(
            Arg::new("auto")
                .long("auto")
                .action(ArgAction::SetTrue)
                .help("Feed each reading character by character."),
        )
        .arg(
            Arg::new("candidates")
                .long("candidates")
                .action(ArgAction::SetTrue)
                .help("Print every phrase with its candidate list."),
        )
        .arg(
            Arg::new("learn")
                .long("learn")
                .action(ArgAction::SetTrue)
                .help("Learn from each conversion."),
        )
        .arg(
            Arg::new("in_enc")
                .long("in-enc")
                .value_name("encoding")
                .default_value("UTF-8")
                .help("Encoding for input: UTF-8|EUC-JP|Shift_JIS|ISO-2022-JP"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dirs) = matches.get_many::<String>("dic_dir") {
        config.dictionary_path.extend(dirs.map(Into::into));
    }
    if config.dictionary_path.is_empty() {
        eprintln!("{BLUE}No dictionary directory given; use --dic-dir or --config.{RESET}");
        return Ok(());
    }

    let mut engine = Engine::new(config)?;
    let cx = engine.create_context();
    let nicknames: Vec<String> = match matches.get_many::<String>("mount") {
        Some(names) => names.cloned().collect(),
        None => engine
            .list_dictionaries()
            .into_iter()
            .filter(|d| matches!(d.kind, MemberKind::Permanent | MemberKind::Temporary))
            .map(|d| d.nickname)
            .collect(),
    };
    for nickname in &nicknames {
        if let Err(err) = engine.mount(cx, nickname) {
            eprintln!("{BLUE}Cannot mount {nickname}: {err}{RESET}");
        }
    }

    let input_file = matches.get_one::<String>("input");
    let mut input: Box<dyn Read> = match input_file {
        Some(file_name) => Box::new(BufReader::new(File::open(file_name)?)),
        None => {
            if io::stdin().is_terminal() {
                println!("{BLUE}Input readings to convert, <ctrl-z> or <ctrl-d> to submit:{RESET}");
            }
            Box::new(io::stdin())
        }
    };
    let buffer = read_input(&mut *input, input_file.is_none())?;
    let in_enc = matches
        .get_one::<String>("in_enc")
        .map(String::as_str)
        .unwrap_or("UTF-8");
    let text = decode_input(&buffer, in_enc)?;

    let mut output = BufWriter::new(match matches.get_one::<String>("output") {
        Some(file_name) => Box::new(File::create(file_name)?) as Box<dyn Write>,
        None => Box::new(io::stdout()) as Box<dyn Write>,
    });

    let opts = Options {
        mode: if matches.get_flag("auto") {
            ConversionMode::Auto
        } else {
            ConversionMode::Renbun
        },
        candidates: matches.get_flag("candidates"),
        learn: matches.get_flag("learn"),
    };
    for line in text.lines() {
        if let Err(err) = convert_line(&mut engine, cx, line, &opts, &mut output) {
            eprintln!("{BLUE}{line}: {err}{RESET}");
        }
    }
    output.flush()?;
    engine.close()?;
    Ok(())
}
