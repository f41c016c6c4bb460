use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::{
        ValueParser,
        styling::{AnsiColor, Effects, Styles},
    },
};

use crate::pdiffcopy::hashing::HashMethod;

/// Accepts a plain number of bytes or a size expression like `64KiB`,
/// `5MB` or `1M` (decimal for `KB`/`MB`/`GB`, binary otherwise).
pub fn validator_block_size() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<u64, String> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, suffix) = s.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("Invalid size expression: '{s}'"))?;
        let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kib" => 1024,
            "kb" => 1000,
            "m" | "mib" => 1024 * 1024,
            "mb" => 1_000_000,
            "g" | "gib" => 1024 * 1024 * 1024,
            "gb" => 1_000_000_000,
            other => return Err(format!("Unknown size suffix: '{other}'")),
        };
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("Size out of range: '{s}'"))?;
        if bytes == 0 {
            return Err(String::from("Block size must be at least 1 byte"));
        }
        Ok(bytes)
    })
}

pub fn validator_hash_method() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<HashMethod, String> {
        s.parse::<HashMethod>().map_err(|e| e.to_string())
    })
}

pub fn validator_concurrency() -> ValueParser {
    ValueParser::from(move |s: &str| -> std::result::Result<usize, String> {
        let value: usize = s.parse().map_err(|_| String::from("Invalid number"))?;
        if value == 0 {
            return Err(String::from("Concurrency must be at least 1"));
        }
        Ok(value)
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("pdiffcopy")
        .about("Fast synchronization of large binary files inspired by rsync.")
        .long_about(
            "pdiffcopy copies files between systems like rsync, but is optimized for \
            very large files (hundreds of gigabytes) by hashing blocks in parallel on \
            multiple CPU cores on both endpoints and copying only the blocks that \
            differ. One of SOURCE and TARGET is a local path, the other an expression \
            of the form HOST:PORT/PATH pointing at a running server. With no \
            positional arguments the server is started.\n\n\
            EXAMPLES:\n\n\
            1. Start a server:\n\
               pdiffcopy --listen 0.0.0.0:8080\n\n\
            2. Download changed blocks from the server (pull):\n\
               pdiffcopy server:8080/data/huge.img /data/huge.img\n\n\
            3. Upload changed blocks to the server (push):\n\
               pdiffcopy /data/huge.img server:8080/data/huge.img\n\n\
            4. Report the similarity index without writing anything:\n\
               pdiffcopy --dry-run server:8080/data/huge.img /data/huge.img",
        )
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("source")
                .help("Where data is read from: a local path or HOST:PORT/PATH")
                .value_name("SOURCE"),
        )
        .arg(
            Arg::new("target")
                .help("Where data is written to: a local path or HOST:PORT/PATH")
                .value_name("TARGET"),
        )
        .arg(
            Arg::new("block_size")
                .short('b')
                .long("block-size")
                .help("Block size of the delta transfer")
                .long_help(
                    "Customize the block size of the delta transfer. Accepts a plain \
                    number of bytes or an expression like 5KB, 1MiB, etc.",
                )
                .value_name("BYTES")
                .value_parser(validator_block_size())
                .default_value("1MiB"),
        )
        .arg(
            Arg::new("hash_method")
                .short('m')
                .long("hash-method")
                .help("Hash method of the delta transfer")
                .long_help(
                    "The digest used to compare blocks; both endpoints must support \
                    it. One of: sha1, sha256, md5, blake3, xxh64.",
                )
                .value_name("NAME")
                .value_parser(validator_hash_method())
                .default_value("sha1"),
        )
        .arg(
            Arg::new("whole_file")
                .short('W')
                .long("whole-file")
                .help("Disable the delta transfer algorithm")
                .long_help(
                    "Skip hashing and copy every block unconditionally. Useful when \
                    the files are known to differ everywhere.",
                )
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .help("Number of parallel block hash / copy operations")
                .value_name("COUNT")
                .value_parser(validator_concurrency()),
        )
        .arg(
            Arg::new("dry_run")
                .short('n')
                .long("dry-run")
                .help("Report the similarity index but don't write any blocks")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .help("Listen on the specified IP:PORT or PORT")
                .long_help(
                    "Starts pdiffcopy in server mode. Accepts HOST:PORT, a bare PORT \
                    or a bare HOST (with the default port 8080).",
                )
                .value_name("ADDR"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase verbosity, -vv for debug")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Decrease verbosity")
                .action(ArgAction::Count),
        )
}
