/**************************************************************************
 *                                                                        *
 * Rust extractor/decoder for the EA Layer 3 audio container.             *
 *                                                                        *
 * Copyright (C) 2026, the ealayer3 authors.                              *
 *                                                                        *
 * This program is free software; you can redistribute it and/or modify   *
 * it under the terms of the GNU General Public License as published by   *
 * the Free Software Foundation, either version 3 of the License, or      *
 * (at your option) any later version.                                    *
 *                                                                        *
 * This program is distributed in the hope that it will be useful,        *
 * but WITHOUT ANY WARRANTY; without even the implied warranty of         *
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the           *
 * GNU General Public License for more details.                           *
 *                                                                        *
 * You should have received a copy of the GNU General Public License      *
 * along with this program. If not, see <http://www.gnu.org/licenses/>.   *
 *                                                                        *
 **************************************************************************/

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{App, Arg};
use tracing::debug;

use ealayer3::blocks::{Block, BlockLoaderSelector, ParserVersion};
use ealayer3::decodefile;
use ealayer3::encodefile;
use ealayer3::mpeggen::MpegGenerator;

/// File handle cap for `--stream all`.
const MAX_OUTPUT_STREAMS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
  Mp3,
  Wave,
  MultiWave,
  Ealayer3,
}

struct Arguments {
  input: PathBuf,
  output: Option<PathBuf>,
  stream_index: usize,
  all_streams: bool,
  offset: u64,
  format: OutputFormat,
  parser: Option<ParserVersion>,
  show_info: bool,
}

fn main() {
  let mut selector_help = String::from("Supported formats:\n");
  {
    let selector = BlockLoaderSelector::new();
    for loader in selector.loaders() {
      selector_help.push_str(&format!("   * {}\n", loader.name()));
      for parser in loader.supported_parsers() {
        selector_help.push_str(&format!("      - {}\n", parser));
      }
    }
  }

  let matches = App::new("ealayer3")
    .version(env!("CARGO_PKG_VERSION"))
    .about("EA Layer 3 stream extractor/decoder.")
    .after_help(selector_help.as_str())
    .arg(
      Arg::with_name("input")
        .value_name("FILE")
        .help("The input file")
        .required(true)
        .index(1),
    )
    .arg(
      Arg::with_name("output")
        .short("o")
        .long("output")
        .value_name("FILE")
        .help("The output filename; derived from the input when omitted")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("stream")
        .short("s")
        .long("stream")
        .value_name("INDEX")
        .help("Which stream to extract (1-based), or 'all'")
        .takes_value(true),
    )
    .arg(
      Arg::with_name("offset")
        .short("i")
        .long("offset")
        .value_name("BYTES")
        .help("The offset in the input file to begin at")
        .takes_value(true),
    )
    .arg(Arg::with_name("mp3").short("m").long("mp3").help("Output to MP3 (no information loss)"))
    .arg(Arg::with_name("wave").short("w").long("wave").help("Output to Microsoft WAV"))
    .arg(
      Arg::with_name("multi-wave")
        .short("M")
        .long("multi-wave")
        .help("Output to a multi-channel Microsoft WAV"),
    )
    .arg(
      Arg::with_name("ealayer3")
        .short("E")
        .long("ealayer3")
        .help("Re-encode an MP3 input into an EALayer3 container"),
    )
    .arg(Arg::with_name("parser5").long("parser5").help("Force the version 5 parser"))
    .arg(Arg::with_name("parser6").long("parser6").help("Force the version 6/7 parser"))
    .arg(Arg::with_name("info").short("n").long("info").help("Output information about the file"))
    .arg(
      Arg::with_name("verbose")
        .short("v")
        .long("verbose")
        .help("Be verbose (useful when streams won't convert)"),
    )
    .arg(Arg::with_name("no-banner").long("no-banner").help("Don't show the banner"))
    .get_matches();

  if !matches.is_present("no-banner") {
    eprintln!(
      "EA Layer 3 Stream Extractor/Decoder {}.",
      env!("CARGO_PKG_VERSION")
    );
    eprintln!();
  }

  let level = if matches.is_present("verbose") {
    tracing::Level::DEBUG
  } else {
    tracing::Level::WARN
  };
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_writer(std::io::stderr)
    .init();

  let (stream_index, all_streams) = match matches.value_of("stream") {
    None => (0, false),
    Some("all") => (0, true),
    Some(text) => match text.parse::<usize>() {
      Ok(n) if n >= 1 => (n - 1, false),
      _ => {
        eprintln!("The arguments are not valid.");
        process::exit(1);
      }
    },
  };

  let offset = match matches.value_of("offset") {
    None => 0,
    Some(text) => match text.parse::<u64>() {
      Ok(n) => n,
      Err(_) => {
        eprintln!("The arguments are not valid.");
        process::exit(1);
      }
    },
  };

  let output = matches.value_of("output").map(PathBuf::from);
  let format = if matches.is_present("ealayer3") {
    OutputFormat::Ealayer3
  } else if matches.is_present("multi-wave") {
    OutputFormat::MultiWave
  } else if matches.is_present("wave") {
    OutputFormat::Wave
  } else if matches.is_present("mp3") {
    OutputFormat::Mp3
  } else {
    format_from_extension(output.as_deref())
  };

  let parser = if matches.is_present("parser5") {
    Some(ParserVersion::V5)
  } else if matches.is_present("parser6") {
    Some(ParserVersion::V6)
  } else {
    None
  };

  let args = Arguments {
    input: PathBuf::from(matches.value_of("input").unwrap_or_default()),
    output,
    stream_index,
    all_streams,
    offset,
    format,
    parser,
    show_info: matches.is_present("info"),
  };

  let code = if args.format == OutputFormat::Ealayer3 {
    encode(&args)
  } else {
    decode(&args)
  };
  process::exit(code);
}

fn format_from_extension(output: Option<&Path>) -> OutputFormat {
  match output.and_then(|p| p.extension()).and_then(|e| e.to_str()) {
    Some(ext) if ext.eq_ignore_ascii_case("wav") => OutputFormat::Wave,
    _ => OutputFormat::Mp3,
  }
}

fn default_output_name(input: &Path, format: OutputFormat) -> PathBuf {
  let extension = match format {
    OutputFormat::Mp3 => "mp3",
    OutputFormat::Wave | OutputFormat::MultiWave => "wav",
    OutputFormat::Ealayer3 => "ealayer3",
  };
  input.with_extension(extension)
}

/// `sound.mp3` becomes `sound_2.mp3` for the second stream.
fn numbered_output(path: &Path, index: usize) -> PathBuf {
  let stem = path
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("output");
  let name = match path.extension().and_then(|e| e.to_str()) {
    Some(ext) => format!("{}_{}.{}", stem, index, ext),
    None => format!("{}_{}", stem, index),
  };
  path.with_file_name(name)
}

fn decode(args: &Arguments) -> i32 {
  // Pick the output name up front so it can be announced.
  let mut announce_output = false;
  let output_path = match &args.output {
    Some(path) => path.clone(),
    None => {
      announce_output = !args.show_info;
      default_output_name(&args.input, args.format)
    }
  };

  let file = match File::open(&args.input) {
    Ok(file) => file,
    Err(_) => {
      eprintln!("Could not open input file '{}'.", args.input.display());
      return 1;
    }
  };
  let mut input = BufReader::new(file);
  if let Err(err) = input.seek(SeekFrom::Start(args.offset)) {
    eprintln!("{}", err);
    return 1;
  }

  let mut selector = BlockLoaderSelector::new();
  if let Err(err) = selector.initialize(&mut input) {
    eprintln!("{}", err);
    return 1;
  }

  let first_block = match selector.read_next_block(&mut input) {
    Ok(Some(block)) => block,
    Ok(None) => {
      eprintln!("The first block could not be read from the input.");
      return 1;
    }
    Err(err) => {
      eprintln!("{}", err);
      return 1;
    }
  };

  let forced = args.parser.or_else(|| selector.parser_version());
  let mut gen = match MpegGenerator::new(&first_block, forced) {
    Ok(gen) => gen,
    Err(_) => {
      eprintln!("The EALayer3 parser could not be initialized (the bitstream format is not readable).");
      return 1;
    }
  };

  if args.stream_index >= gen.stream_count() {
    eprintln!(
      "The stream index ({}) exceeds the total number of streams ({}).",
      args.stream_index + 1,
      gen.stream_count()
    );
    return 1;
  }

  if args.show_info {
    println!("Stream count: {}", gen.stream_count());
    println!();
    if args.output.is_none() {
      return 0;
    }
  }

  if args.all_streams && gen.stream_count() > MAX_OUTPUT_STREAMS {
    eprintln!("Too many streams to be decoded.");
    return 1;
  }

  debug!("parsing blocks");
  if let Err(err) = parse_all_blocks(&mut gen, &mut selector, &mut input, &first_block) {
    eprintln!("Problems reading the input file.");
    eprintln!("Exception: {}", err);
    return 1;
  }

  debug!("writing output");
  let announce = announce_output || args.show_info;
  if let Err(err) = write_outputs(args, &gen, &output_path, announce) {
    eprintln!("{}", err);
    return 1;
  }

  if args.show_info {
    println!(
      "Uncompressed sample frames: {}",
      gen.uncompressed_sample_frames()
    );
    if let Ok(position) = input.stream_position() {
      println!("End offset in file: {}", position);
    }
  }

  0
}

fn parse_all_blocks(
  gen: &mut MpegGenerator,
  selector: &mut BlockLoaderSelector,
  input: &mut BufReader<File>,
  first_block: &Block,
) -> ealayer3::error::Result<()> {
  gen.parse_block(first_block)?;
  while let Some(block) = selector.read_next_block(input)? {
    gen.parse_block(&block)?;
  }
  gen.done_parsing_blocks();
  Ok(())
}

fn write_outputs(
  args: &Arguments,
  gen: &MpegGenerator,
  output_path: &Path,
  announce: bool,
) -> ealayer3::error::Result<()> {
  if args.format == OutputFormat::MultiWave {
    let output = create_output(output_path, announce)?;
    decodefile::write_multi_wav(gen, BufWriter::new(output))?;
    return Ok(());
  }

  if args.all_streams && gen.stream_count() > 1 {
    for stream in 0..gen.stream_count() {
      let path = numbered_output(output_path, stream + 1);
      let output = create_output(&path, announce)?;
      write_single_stream(args, gen, stream, output)?;
    }
  } else {
    let output = create_output(output_path, announce)?;
    write_single_stream(args, gen, args.stream_index, output)?;
  }
  Ok(())
}

fn write_single_stream(
  args: &Arguments,
  gen: &MpegGenerator,
  stream: usize,
  output: File,
) -> ealayer3::error::Result<()> {
  match args.format {
    OutputFormat::Wave => {
      decodefile::write_wav_stream(gen, stream, BufWriter::new(output))?;
    }
    _ => {
      let mut writer = BufWriter::new(output);
      decodefile::write_mp3_stream(gen, stream, &mut writer)?;
      writer.flush()?;
    }
  }
  Ok(())
}

fn create_output(path: &Path, announce: bool) -> ealayer3::error::Result<File> {
  if announce {
    println!("Output: {}", path.display());
  }
  Ok(File::create(path)?)
}

fn encode(args: &Arguments) -> i32 {
  let output_path = match &args.output {
    Some(path) => path.clone(),
    None => default_output_name(&args.input, OutputFormat::Ealayer3),
  };

  let file = match File::open(&args.input) {
    Ok(file) => file,
    Err(_) => {
      eprintln!("Could not open input file '{}'.", args.input.display());
      return 1;
    }
  };
  let mut input = BufReader::new(file);
  if args.offset > 0 {
    if let Err(err) = input.seek(SeekFrom::Start(args.offset)) {
      eprintln!("{}", err);
      return 1;
    }
  }

  let output = match File::create(&output_path) {
    Ok(file) => file,
    Err(_) => {
      eprintln!("Could not open output file '{}'.", output_path.display());
      return 1;
    }
  };
  let mut writer = BufWriter::new(output);

  match encodefile::mp3_to_single_block(input, &mut writer).and_then(|stats| {
    writer.flush()?;
    Ok(stats)
  }) {
    Ok(stats) => {
      debug!(frames = stats.frames, samples = stats.samples, "encoded");
      0
    }
    Err(err) => {
      eprintln!("Problems reading the input file.");
      eprintln!("Exception: {}", err);
      1
    }
  }
}
