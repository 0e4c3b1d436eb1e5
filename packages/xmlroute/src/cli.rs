//! Command-line interface for the router.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use console::style;
use serde::Serialize;

use crate::error::{Result, RouterError, SourceError};
use crate::registry::{Element, ParseOutcome, PathLocation, Traversal, XmlParser};
use crate::rule::{Rule, RuleType};
use crate::source::{Encoding, XmlEvent, XmlParserFactory};

/// xmlroute - Route streaming XML events to handlers by location path.
#[derive(Parser)]
#[command(name = "xmlroute")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Input encoding label (utf-8, utf-16le, iso-8859-1, ...); detected if omitted
    #[arg(short, long, global = true)]
    pub encoding: Option<Encoding>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List every location path in the document with its number of occurrences.
    Paths {
        /// XML document to read
        file: PathBuf,
    },

    /// Count the elements found at the given paths.
    Count {
        /// XML document to read
        file: PathBuf,

        /// Location path to count (e.g., /imdb/category/movie)
        #[arg(short, long = "path", required = true)]
        paths: Vec<String>,
    },

    /// Print character data and attribute values found at the given paths.
    Extract {
        /// XML document to read
        file: PathBuf,

        /// Location path whose text to print
        #[arg(short, long = "text")]
        text: Vec<String>,

        /// Attribute to print, as PATH@NAME (e.g., /imdb/category/movie@id)
        #[arg(short, long = "attr")]
        attr: Vec<String>,

        /// Stop reading after this many matches
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print one JSON object per match
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let factory = XmlParserFactory::from_env();

    match cli.command {
        Commands::Paths { file } => paths_command(&factory, &file, cli.encoding),
        Commands::Count { file, paths } => count_command(&factory, &file, cli.encoding, &paths),
        Commands::Extract {
            file,
            text,
            attr,
            limit,
            json,
        } => {
            let rules = extract_rules(&text, &attr, limit)?;
            extract_command(&factory, &file, cli.encoding, rules, limit, json)
        }
    }
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        RouterError::Source(SourceError::Io(std::io::Error::new(
            e.kind(),
            format!("Cannot open {}: {e}", path.display()),
        )))
    })
}

fn parse_file<S>(
    parser: &XmlParser<S>,
    path: &Path,
    encoding: Option<Encoding>,
    state: &mut S,
) -> Result<ParseOutcome> {
    let file = open_file(path)?;
    match encoding {
        Some(encoding) => parser.parse_reader_with_encoding(file, encoding, state),
        None => parser.parse_reader(file, state),
    }
}

/// Execute the paths command.
///
/// Walks the document without rules, so it drives a session directly.
fn paths_command(
    factory: &XmlParserFactory,
    path: &Path,
    encoding: Option<Encoding>,
) -> Result<()> {
    let mut session = factory.open(open_file(path)?, encoding)?;
    let mut location = PathLocation::new();
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    loop {
        match session.next_event()? {
            XmlEvent::StartElement(tag) => {
                location.push(tag.local_name(), tag.namespace());
                match index.get(location.as_str()) {
                    Some(&i) => order[i].1 += 1,
                    None => {
                        index.insert(location.as_str().to_string(), order.len());
                        order.push((location.as_str().to_string(), 1));
                    }
                }
            }
            XmlEvent::EndElement => {
                location.pop();
            }
            XmlEvent::Characters(_) => {}
            XmlEvent::EndOfDocument => break,
        }
    }

    for (path, count) in &order {
        println!("{:>8}  {}", style(count).green(), path);
    }
    Ok(())
}

/// Execute the count command.
fn count_command(
    factory: &XmlParserFactory,
    path: &Path,
    encoding: Option<Encoding>,
    paths: &[String],
) -> Result<()> {
    let rules = paths
        .iter()
        .enumerate()
        .map(|(i, p)| {
            Rule::element(
                p.as_str(),
                move |element: Element, counts: &mut Vec<usize>, _: &mut Traversal| {
                    if element == Element::Start {
                        if let Some(count) = counts.get_mut(i) {
                            *count += 1;
                        }
                    }
                },
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let parser = factory.new_parser(rules)?;
    let mut counts = vec![0usize; paths.len()];
    parse_file(&parser, path, encoding, &mut counts)?;

    for (p, count) in paths.iter().zip(&counts) {
        println!("{:>8}  {}", style(count).green(), p);
    }
    Ok(())
}

/// A value printed by the extract command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    pub value: String,
}

/// State of the extract command: collected matches and the optional limit.
#[derive(Debug, Default)]
pub struct Extraction {
    pub matches: Vec<Match>,
    pub limit: Option<usize>,
}

impl Extraction {
    /// Keep `found` unless the limit is reached, and stop once it is.
    ///
    /// Several rules can match the same event, so a match may arrive after
    /// the stop was requested.
    fn record(&mut self, found: Match, traversal: &mut Traversal) {
        let Some(limit) = self.limit else {
            self.matches.push(found);
            return;
        };
        if self.matches.len() < limit {
            self.matches.push(found);
        }
        if self.matches.len() >= limit {
            traversal.stop();
        }
    }
}

/// Split an attribute selector `PATH@NAME` at the first `@` outside brackets.
fn split_attr_selector(selector: &str) -> Result<(&str, &str)> {
    let mut depth = 0usize;
    let at = selector.char_indices().find_map(|(i, c)| {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '@' if depth == 0 => return Some(i),
            _ => {}
        }
        None
    });

    at.map(|i| (&selector[..i], &selector[i + 1..]))
        .filter(|(path, name)| !path.is_empty() && !name.is_empty())
        .ok_or_else(|| {
            RouterError::InvalidConfig(format!(
                "attribute selector '{selector}' must look like PATH@NAME"
            ))
        })
}

/// Build the rules of the extract command.
///
/// # Errors
/// Returns `InvalidConfig` when no selector is given or an attribute selector
/// has no `@`, and the rule construction errors for bad paths or names.
pub fn extract_rules(
    text: &[String],
    attr: &[String],
    limit: Option<usize>,
) -> Result<Vec<Rule<Extraction>>> {
    if text.is_empty() && attr.is_empty() {
        return Err(RouterError::InvalidConfig(
            "nothing to extract, pass --text PATH or --attr PATH@NAME".to_string(),
        ));
    }
    if limit == Some(0) {
        return Err(RouterError::InvalidConfig(
            "limit must be greater than zero".to_string(),
        ));
    }

    let mut rules = Vec::with_capacity(text.len() + attr.len());

    for path in text {
        let rule = Rule::characters(
            path.as_str(),
            |value: &str, state: &mut Extraction, traversal: &mut Traversal| {
                if value.is_empty() {
                    return;
                }
                let found = Match {
                    path: traversal.path().to_string(),
                    attribute: None,
                    value: value.to_string(),
                };
                state.record(found, traversal);
            },
        )?;
        rules.push(rule);
    }

    for selector in attr {
        let (path, name) = split_attr_selector(selector)?;
        let rule = Rule::builder(RuleType::Attribute, path)
            .on_attribute(
                |name: &str, value: Option<&str>, state: &mut Extraction, traversal: &mut Traversal| {
                    if let Some(value) = value {
                        let found = Match {
                            path: traversal.path().to_string(),
                            attribute: Some(name.to_string()),
                            value: value.to_string(),
                        };
                        state.record(found, traversal);
                    }
                },
            )
            .attribute_name(name)
            .build()?;
        rules.push(rule);
    }

    Ok(rules)
}

/// Execute the extract command.
fn extract_command(
    factory: &XmlParserFactory,
    path: &Path,
    encoding: Option<Encoding>,
    rules: Vec<Rule<Extraction>>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let parser = factory.new_parser(rules)?;
    let mut state = Extraction {
        matches: Vec::new(),
        limit,
    };
    let outcome = parse_file(&parser, path, encoding, &mut state)?;
    tracing::debug!(?outcome, matches = state.matches.len(), "Extraction finished");

    for found in &state.matches {
        if json {
            println!("{}", serde_json::to_string(found)?);
        } else {
            match &found.attribute {
                Some(name) => println!("{}@{}\t{}", style(&found.path).cyan(), name, found.value),
                None => println!("{}\t{}", style(&found.path).cyan(), found.value),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_paths() {
        let cli = Cli::parse_from(["xmlroute", "paths", "movies.xml"]);

        let Commands::Paths { file } = cli.command else {
            panic!("expected paths command");
        };
        assert_eq!(file, PathBuf::from("movies.xml"));
        assert!(cli.encoding.is_none());
    }

    #[test]
    fn test_cli_parse_count_requires_path() {
        assert!(Cli::try_parse_from(["xmlroute", "count", "movies.xml"]).is_err());

        let cli = Cli::parse_from([
            "xmlroute",
            "count",
            "movies.xml",
            "--path",
            "/imdb/category",
            "-p",
            "/imdb/category/movie",
        ]);
        let Commands::Count { paths, .. } = cli.command else {
            panic!("expected count command");
        };
        assert_eq!(paths, vec!["/imdb/category", "/imdb/category/movie"]);
    }

    #[test]
    fn test_cli_parse_extract_with_encoding() {
        let cli = Cli::parse_from([
            "xmlroute",
            "extract",
            "movies.xml",
            "--text",
            "/imdb/category/movie/title",
            "--attr",
            "/imdb/category/movie@id",
            "--limit",
            "3",
            "--json",
            "--encoding",
            "latin1",
        ]);

        assert_eq!(cli.encoding, Some(Encoding::latin1()));
        let Commands::Extract {
            text,
            attr,
            limit,
            json,
            ..
        } = cli.command
        else {
            panic!("expected extract command");
        };
        assert_eq!(text, vec!["/imdb/category/movie/title"]);
        assert_eq!(attr, vec!["/imdb/category/movie@id"]);
        assert_eq!(limit, Some(3));
        assert!(json);
    }

    #[test]
    fn test_cli_rejects_unknown_encoding() {
        assert!(Cli::try_parse_from(["xmlroute", "--encoding", "ebcdic", "paths", "a.xml"]).is_err());
    }

    #[test]
    fn test_split_attr_selector() {
        assert_eq!(
            split_attr_selector("/a/b@id").unwrap(),
            ("/a/b", "id")
        );
        assert_eq!(
            split_attr_selector("/[urn:a@b]x@[urn:c@d]id").unwrap(),
            ("/[urn:a@b]x", "[urn:c@d]id")
        );
        assert!(split_attr_selector("/a/b").is_err());
        assert!(split_attr_selector("@id").is_err());
        assert!(split_attr_selector("/a@").is_err());
    }

    #[test]
    fn test_extract_rules_validation() {
        assert!(matches!(
            extract_rules(&[], &[], None),
            Err(RouterError::InvalidConfig(_))
        ));
        assert!(matches!(
            extract_rules(&["/a".to_string()], &[], Some(0)),
            Err(RouterError::InvalidConfig(_))
        ));
        assert!(matches!(
            extract_rules(&["/a/".to_string()], &[], None),
            Err(RouterError::InvalidPath { .. })
        ));
        assert!(matches!(
            extract_rules(&[], &["/a@[urn:x".to_string()], None),
            Err(RouterError::MalformedAttributeName { .. })
        ));
    }

    #[test]
    fn test_extract_rules_collect_and_stop() {
        let rules = extract_rules(
            &["/r/item".to_string()],
            &["/r/item@n".to_string()],
            Some(3),
        )
        .unwrap();
        let parser = XmlParserFactory::new().new_parser(rules).unwrap();

        let mut state = Extraction {
            matches: Vec::new(),
            limit: Some(3),
        };
        let outcome = parser
            .parse_str(
                r#"<r><item n="1">one</item><item>  </item><item n="3">three</item></r>"#,
                &mut state,
            )
            .unwrap();

        assert_eq!(outcome, ParseOutcome::Stopped);
        let values: Vec<_> = state.matches.iter().map(|m| m.value.as_str()).collect();
        assert_eq!(values, vec!["1", "one", "3"]);
        assert_eq!(state.matches[0].attribute.as_deref(), Some("n"));
        assert_eq!(state.matches[1].path, "/r/item");
    }

    #[test]
    fn test_extract_limit_holds_when_rules_share_an_event() {
        let rules = extract_rules(
            &[],
            &["/r/item@a".to_string(), "/r/item@b".to_string()],
            Some(1),
        )
        .unwrap();
        let parser = XmlParserFactory::new().new_parser(rules).unwrap();

        let mut state = Extraction {
            matches: Vec::new(),
            limit: Some(1),
        };
        let outcome = parser
            .parse_str(r#"<r><item a="1" b="2"/><item a="3"/></r>"#, &mut state)
            .unwrap();

        assert_eq!(outcome, ParseOutcome::Stopped);
        assert_eq!(state.matches.len(), 1);
        assert_eq!(state.matches[0].value, "1");
    }
}
