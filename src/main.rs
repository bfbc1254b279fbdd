use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgMatches, Command, arg, command, value_parser};
use indexmap::IndexSet;

use regex_thompson::{Config, MatchOutcome, MatcherMemory, Regex, postfix};

const FILE_LONG_HELP: &str = r#"Match subjects against every pattern in a file

Each non-blank line of <PATTERNS_FILE> is one pattern. Duplicate lines are
dropped, keeping the first occurrence, and the rest are combined into a
single pattern as `(p1)|(p2)|...`. A subject matches when any line does.
"#;

fn command(name: &'static str) -> Command {
    Command::new(name).help_template(
        r#"{about-with-newline}
{usage-heading}
    {usage}

{all-args}
"#,
    )
}

fn subjects_arg() -> clap::Arg {
    arg!([SUBJECT] ...).help("Subjects to match; read one per line from stdin when omitted")
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();

    let args = command!()
        .arg_required_else_help(true)
        .arg(
            arg!(--"max-pattern-len" <BYTES>)
                .help("Longest pattern accepted")
                .global(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--"max-subject-len" <BYTES>)
                .help("Longest subject accepted")
                .global(true)
                .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--fuel <VISITS>)
                .help("Give up on a subject after this many state visits")
                .global(true)
                .value_parser(value_parser!(usize)),
        )
        .subcommands(vec![
            command("match")
                .about("Match subjects against a pattern")
                .arg(arg!(<PATTERN>).help("Pattern to match"))
                .arg(subjects_arg()),
            command("file")
                .about("Match subjects against every pattern in a file")
                .long_about(FILE_LONG_HELP)
                .arg(
                    arg!(<PATTERNS_FILE>)
                        .help("File with one pattern per line")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(subjects_arg()),
            command("dot")
                .about("Print the automaton for a pattern in Graphviz DOT format")
                .arg(arg!(<PATTERN>).help("Pattern to compile")),
            command("postfix")
                .about("Print the postfix form of a pattern")
                .arg(arg!(<PATTERN>).help("Pattern to convert")),
        ])
        .get_matches();

    let config = config_from_args(&args);

    match args.subcommand() {
        Some(("match", args)) => cmd_match(args, config),
        Some(("file", args)) => cmd_file(args, config),
        Some(("dot", args)) => cmd_dot(args, config),
        Some(("postfix", args)) => cmd_postfix(args),
        _ => unreachable!(),
    }
}

fn config_from_args(args: &ArgMatches) -> Config {
    let mut config = Config::new();
    if let Some(&len) = args.get_one::<usize>("max-pattern-len") {
        config = config.max_pattern_len(len);
    }
    if let Some(&len) = args.get_one::<usize>("max-subject-len") {
        config = config.max_subject_len(len);
    }
    config.fuel(args.get_one::<usize>("fuel").copied())
}

fn pattern_arg(args: &ArgMatches) -> &str {
    args.get_one::<String>("PATTERN")
        .map(String::as_str)
        .unwrap_or_default()
}

fn cmd_match(args: &ArgMatches, config: Config) -> anyhow::Result<ExitCode> {
    let pattern = pattern_arg(args);
    let regex = Regex::with_config(pattern, config)
        .with_context(|| format!("invalid pattern `{}`", pattern))?;
    run_subjects(&regex, args)
}

fn cmd_file(args: &ArgMatches, config: Config) -> anyhow::Result<ExitCode> {
    let path = args
        .get_one::<PathBuf>("PATTERNS_FILE")
        .context("missing patterns file")?;
    let src = fs::read(path).with_context(|| format!("can not read `{}`", path.display()))?;
    let pattern = combine_patterns(&src);
    log::debug!("combined pattern: {}", pattern.escape_ascii());
    let regex = Regex::with_config(&pattern, config)
        .with_context(|| format!("invalid pattern in `{}`", path.display()))?;
    run_subjects(&regex, args)
}

fn cmd_dot(args: &ArgMatches, config: Config) -> anyhow::Result<ExitCode> {
    let pattern = pattern_arg(args);
    let regex = Regex::with_config(pattern, config)
        .with_context(|| format!("invalid pattern `{}`", pattern))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    regex.automaton().to_dot(&mut out)?;
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_postfix(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let pattern = pattern_arg(args);
    let tokens = postfix::compile(pattern.as_bytes())
        .with_context(|| format!("invalid pattern `{}`", pattern))?;
    println!("{}", postfix::render(&tokens));
    Ok(ExitCode::SUCCESS)
}

/// Join the non-blank, distinct lines of `src` into `(p1)|(p2)|...`.
fn combine_patterns(src: &[u8]) -> Vec<u8> {
    let lines: IndexSet<&[u8]> = src
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .collect();

    let mut pattern = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            pattern.push(b'|');
        }
        pattern.push(b'(');
        pattern.extend_from_slice(line);
        pattern.push(b')');
    }
    pattern
}

/// Split `reader` into byte lines, without the `\n` or `\r\n` ending.
/// Subjects need not be UTF-8.
fn subject_lines(reader: impl BufRead) -> impl Iterator<Item = io::Result<Vec<u8>>> {
    reader.split(b'\n').map(|line| {
        line.map(|mut line| {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    })
}

/// Match every subject, printing one line each.  Succeeds only when all
/// subjects matched.
fn run_subjects(regex: &Regex, args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let mut memory = MatcherMemory::default();
    let mut any_failed = false;

    let mut report = |subject: &[u8]| {
        let outcome = regex.run_with(&mut memory, subject).unwrap_or_else(|err| {
            eprintln!("error: {}", err);
            MatchOutcome::default()
        });
        if outcome.accepted {
            println!(
                "  \x1b[32mMATCH\x1b[0m     \"{}\" (consumed \"{}\")",
                subject.escape_ascii(),
                outcome.captured.escape_ascii()
            );
        } else {
            println!("  \x1b[31mNO MATCH\x1b[0m  \"{}\"", subject.escape_ascii());
            any_failed = true;
        }
    };

    match args.get_many::<String>("SUBJECT") {
        Some(subjects) => {
            for subject in subjects {
                report(subject.as_bytes());
            }
        }
        None => {
            for line in subject_lines(io::stdin().lock()) {
                report(&line?);
            }
        }
    }

    Ok(if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_patterns() {
        assert_eq!(combine_patterns(b"ab\nc*\n"), b"(ab)|(c*)");
        assert_eq!(combine_patterns(b"a\r\n\r\nb\n"), b"(a)|(b)");
        assert_eq!(combine_patterns(b"x\ny\nx\n"), b"(x)|(y)");
        assert_eq!(combine_patterns(b""), b"");
    }

    #[test]
    fn test_subject_lines_are_bytes() {
        let input: &[u8] = b"ab\r\n\xff\xfe\n\nlast";
        let lines = subject_lines(input).collect::<io::Result<Vec<_>>>().unwrap();
        assert_eq!(
            lines,
            vec![b"ab".to_vec(), vec![0xff, 0xfe], vec![], b"last".to_vec()]
        );
    }

    #[test]
    fn test_combined_patterns_match_any_line() {
        let regex = Regex::new(combine_patterns(b"ab+\n[0-9]*\nxy|z\n")).unwrap();
        for subject in ["abbb", "42", "", "xy", "z"] {
            assert!(regex.is_match(subject), "{:?}", subject);
        }
        assert!(!regex.is_match("ba"));
    }
}
