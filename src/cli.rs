use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the credsift pipeline.
///
/// The tool sweeps an input directory for archives, unlocks them against a
/// password dictionary, and harvests credential triplets out of any extracted
/// dump files. Callers that feed the input directory (watchers, bots, manual
/// drops) only need the directory contract: processed archives disappear,
/// failures move to quarantine, everything else is left alone.
#[derive(Parser, Debug)]
#[clap(name = "credsift", about = "Bulk archive unlock and credential-dump harvester")]
pub struct Args {
    /// Directory scanned for input archives (.zip/.rar/.7z)
    #[clap(short, long)]
    pub input: PathBuf,

    /// Directory where extracted credential dumps are staged before parsing
    #[clap(long, default_value = "pass")]
    pub pass_dir: PathBuf,

    /// Directory receiving archives that could not be processed
    #[clap(long, default_value = "quarantine")]
    pub quarantine_dir: PathBuf,

    /// Password dictionary file, one candidate per line; missing file means
    /// only the no-password attempt is made
    #[clap(short, long, default_value = "passwords.txt")]
    pub dictionary: PathBuf,

    /// Credential output file, appended across runs
    #[clap(short, long, default_value = "credentials.txt")]
    pub output: PathBuf,

    /// Directory for the JSON run summary (defaults to the input directory's
    /// parent, falling back to the current directory)
    #[clap(long)]
    pub summary_dir: Option<PathBuf>,

    /// Scan the input directory recursively
    #[clap(short, long)]
    pub recursive: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let args = Args::parse_from(["credsift", "--input", "/srv/drop"]);
        assert_eq!(args.input, PathBuf::from("/srv/drop"));
        assert_eq!(args.pass_dir, PathBuf::from("pass"));
        assert_eq!(args.output, PathBuf::from("credentials.txt"));
        assert!(!args.recursive);
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "credsift",
            "-i",
            "/srv/drop",
            "-d",
            "/etc/wordlist.txt",
            "-o",
            "/var/creds.txt",
            "-r",
            "-v",
        ]);
        assert_eq!(args.dictionary, PathBuf::from("/etc/wordlist.txt"));
        assert_eq!(args.output, PathBuf::from("/var/creds.txt"));
        assert!(args.recursive);
        assert!(args.verbose);
    }
}
