//! Search query mini-language.
//!
//! Free-text search strings are turned into an ordered list of OR-groups, each an ordered
//! list of AND-terms:
//!
//! - `,` separates alternatives (OR), a space separates terms (AND);
//! - text inside double quotes is literal, so `"harry potter"` is a single term;
//! - `(a,b)` expands into one alternative per option, concatenated with the surrounding
//!   text the way shell brace expansion does, and `(a,b)*` also keeps the variant without
//!   the group;
//! - a leading `-` on a term marks it as negated; the parser keeps the marker and leaves its
//!   interpretation to the caller;
//! - terms are percent-decoded.
//!
//! ```ignore
//! use shelf_core::search::SearchQuery;
//!
//! let query = SearchQuery::parse("\"lord of\" (ring,rings), -hobbit")?;
//! assert_eq!(query.words(), &[
//!     vec!["lord of".to_string(), "ring".to_string()],
//!     vec!["lord of".to_string(), "rings".to_string()],
//!     vec!["-hobbit".to_string()],
//! ]);
//! ```

use crate::{
    error::ParseError,
    filter::{Condition, FilterList, FilterObject},
};

/// Verbs that introduce a structured search clause instead of free text.
pub const RESERVED_VERBS: [&str; 6] = ["FROM:", "SOURCE:", "TO:", "TYPE:", "LANG:", "LINK:"];

/// Prefix that marks a term as negated.
pub const NEGATION_PREFIX: char = '-';

const OR_SEPARATOR: char = ',';
const AND_SEPARATOR: char = ' ';
const QUOTE: char = '"';
const GROUP_OPEN: char = '(';
const GROUP_CLOSE: char = ')';
const OPTIONAL_GROUP: char = '*';

/// A piece of one OR-group before expansion.
#[derive(Debug)]
enum Segment {
    Text(String),
    Alternatives(Vec<String>),
}

/// A parsed search string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    raw: String,
    words: Vec<Vec<String>>,
}

impl SearchQuery {
    /// Parses a raw search string.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for an unterminated quote, an unbalanced bracket or a
    /// bracket group opened inside another one.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Ok(Self { raw: raw.to_string(), words: parse(raw)? })
    }

    /// Returns the original search string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the OR-groups of AND-terms.
    pub fn words(&self) -> &[Vec<String>] {
        &self.words
    }

    pub fn into_words(self) -> Vec<Vec<String>> {
        self.words
    }

    /// Builds a filter that searches the given fields for every OR-group.
    ///
    /// Each OR-group yields one filter-object per field. The object starts from the `extra`
    /// conditions and adds `CONTAINS term` on that field for each non-reserved term, or
    /// `!CONTAINS term` when the term carries the negation prefix.
    pub fn to_filter(&self, fields: &[&str], extra: &FilterObject) -> FilterList {
        let mut filter = FilterList::all();

        for group in &self.words {
            let terms = group
                .iter()
                .map(|word| Term::parse(word))
                .filter(|term| !term.text.is_empty() && !is_reserved(term.text))
                .collect::<Vec<_>>();

            for field in fields {
                let mut object = extra.clone();

                for term in &terms {
                    object.push(*field, term.condition());
                }

                filter.push(object);
            }
        }

        filter
    }
}

/// A search term with its negation prefix resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Term<'a> {
    pub text: &'a str,
    pub negated: bool,
}

impl<'a> Term<'a> {
    pub fn parse(word: &'a str) -> Self {
        match word.strip_prefix(NEGATION_PREFIX) {
            Some(text) => Self { text, negated: true },
            None => Self { text: word, negated: false },
        }
    }

    /// The substring condition this term stands for.
    pub fn condition(&self) -> Condition {
        let condition = Condition::contains(self.text);

        if self.negated { condition.not() } else { condition }
    }
}

/// Parses a raw search string into OR-groups of AND-terms.
///
/// A string without any term yields a single empty group (`[[]]`).
pub fn parse(raw: &str) -> Result<Vec<Vec<String>>, ParseError> {
    let words = split_groups(raw)?
        .into_iter()
        .flat_map(expand)
        .map(|alternative| {
            alternative
                .split(AND_SEPARATOR)
                .filter(|term| !term.is_empty())
                .map(percent_decode)
                .collect::<Vec<_>>()
        })
        .filter(|terms| !terms.is_empty())
        .collect::<Vec<_>>();

    if words.is_empty() {
        return Ok(vec![vec![]]);
    }

    Ok(words)
}

/// Returns `true` if the word starts with a reserved verb, ignoring case and an optional
/// negation prefix.
pub fn is_reserved(word: &str) -> bool {
    let upper = word.to_uppercase();
    let rest = upper.strip_prefix(NEGATION_PREFIX).unwrap_or(&upper);

    RESERVED_VERBS
        .iter()
        .any(|verb| rest.starts_with(verb))
}

/// Upper-cases a word and strips the first occurrence of every reserved verb.
pub fn clean_reserved(word: &str) -> String {
    RESERVED_VERBS
        .iter()
        .fold(word.to_uppercase(), |cleaned, verb| cleaned.replacen(verb, "", 1))
}

/// Scans the raw string into OR-groups of segments.
///
/// Quoted characters are escaped on the way so that separators inside quotes survive the
/// later splits. Brackets open alternative groups whose options are split on commas.
fn split_groups(raw: &str) -> Result<Vec<Vec<Segment>>, ParseError> {
    let mut groups = Vec::new();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut alternatives: Option<(usize, Vec<String>)> = None;
    let mut quote_start = None;
    let mut chars = raw.char_indices().peekable();

    while let Some((position, ch)) = chars.next() {
        if ch == QUOTE {
            quote_start = match quote_start {
                Some(_) => None,
                None => Some(position),
            };
            continue;
        }

        if quote_start.is_some() {
            match ch {
                ' ' => text.push_str("%20"),
                ',' => text.push_str("%2C"),
                '(' => text.push_str("%28"),
                ')' => text.push_str("%29"),
                _ => text.push(ch),
            }
            continue;
        }

        match (ch, alternatives.as_mut()) {
            (GROUP_OPEN, Some(_)) => return Err(ParseError::NestedBracket(position)),
            (GROUP_OPEN, None) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                alternatives = Some((position, Vec::new()));
            }
            (GROUP_CLOSE, None) => return Err(ParseError::UnexpectedClosingBracket(position)),
            (GROUP_CLOSE, Some((_, options))) => {
                options.push(std::mem::take(&mut text));

                if chars.next_if(|(_, next)| *next == OPTIONAL_GROUP).is_some() {
                    options.push(String::new());
                }

                if let Some((_, options)) = alternatives.take() {
                    segments.push(Segment::Alternatives(options));
                }
            }
            (OR_SEPARATOR, Some((_, options))) => options.push(std::mem::take(&mut text)),
            (OR_SEPARATOR, None) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                groups.push(std::mem::take(&mut segments));
            }
            (OPTIONAL_GROUP, _) => {}
            _ => text.push(ch),
        }
    }

    if let Some(start) = quote_start {
        return Err(ParseError::UnterminatedQuote(start));
    }
    if let Some((start, _)) = alternatives {
        return Err(ParseError::UnclosedBracket(start));
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    groups.push(segments);

    Ok(groups)
}

/// Expands the alternative groups of one OR-group into plain strings.
///
/// Every group multiplies the partial strings by its number of options. New options drive
/// the outer loop, so `(a,b)(c,d)` yields `ac`, `bc`, `ad`, `bd`.
fn expand(segments: Vec<Segment>) -> Vec<String> {
    let mut partials: Vec<String> = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text(text) if partials.is_empty() => partials.push(text),
            Segment::Text(text) => partials
                .iter_mut()
                .for_each(|partial| partial.push_str(&text)),
            Segment::Alternatives(options) if partials.is_empty() => partials = options,
            Segment::Alternatives(options) => {
                partials = options
                    .iter()
                    .flat_map(|option| {
                        partials
                            .iter()
                            .map(move |partial| format!("{partial}{option}"))
                    })
                    .collect();
            }
        }
    }

    partials
}

/// Decodes `%XX` escapes. Malformed escapes are kept as they are.
fn percent_decode(term: &str) -> String {
    let bytes = term.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let high = (bytes[index + 1] as char).to_digit(16);
            let low = (bytes[index + 2] as char).to_digit(16);

            if let (Some(high), Some(low)) = (high, low) {
                decoded.push((high * 16 + low) as u8);
                index += 3;
                continue;
            }
        }

        decoded.push(bytes[index]);
        index += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(raw: &str) -> Vec<Vec<String>> {
        parse(raw).unwrap()
    }

    fn groups(expected: &[&[&str]]) -> Vec<Vec<String>> {
        expected
            .iter()
            .map(|group| group.iter().map(|term| term.to_string()).collect())
            .collect()
    }

    #[test]
    fn plain_text_is_one_group_of_terms() {
        assert_eq!(words("the  hobbit tolkien"), groups(&[&["the", "hobbit", "tolkien"]]));
    }

    #[test]
    fn commas_separate_groups() {
        assert_eq!(words("a,b"), groups(&[&["a"], &["b"]]));
        assert_eq!(words("a,,b,"), groups(&[&["a"], &["b"]]));
    }

    #[test]
    fn quotes_keep_separators_literal() {
        assert_eq!(words("\"a b\",c"), groups(&[&["a b"], &["c"]]));
        assert_eq!(words("\"x,(y)\" z"), groups(&[&["x,(y)", "z"]]));
    }

    #[test]
    fn brackets_expand_with_surrounding_text() {
        assert_eq!(words("(a,b)c"), groups(&[&["ac"], &["bc"]]));
        assert_eq!(words("x (a,b)"), groups(&[&["x", "a"], &["x", "b"]]));
        assert_eq!(words("(a,b)(c,d)"), groups(&[&["ac"], &["bc"], &["ad"], &["bd"]]));
        assert_eq!(words("book, (harry potter,lotr) film"), groups(&[
            &["book"],
            &["harry", "potter", "film"],
            &["lotr", "film"],
        ]));
    }

    #[test]
    fn starred_group_is_optional() {
        assert_eq!(words("ring(s)*"), groups(&[&["rings"], &["ring"]]));
        assert_eq!(words("a*b"), groups(&[&["ab"]]));
    }

    #[test]
    fn negation_marker_is_kept() {
        assert_eq!(words("-foo"), groups(&[&["-foo"]]));
        assert!(!is_reserved("-foo"));
        assert!(is_reserved("-from:x"));
        assert!(is_reserved("Type:book"));
        assert!(!is_reserved("platform:x"));
    }

    #[test]
    fn empty_input_is_one_empty_group() {
        assert_eq!(words(""), vec![Vec::<String>::new()]);
        assert_eq!(words(" , "), vec![Vec::<String>::new()]);
    }

    #[test]
    fn terms_are_percent_decoded() {
        assert_eq!(words("caf%C3%A9 100% a%2"), groups(&[&["café", "100%", "a%2"]]));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(parse("\"open"), Err(ParseError::UnterminatedQuote(0)));
        assert_eq!(parse("x (a,b"), Err(ParseError::UnclosedBracket(2)));
        assert_eq!(parse("a)"), Err(ParseError::UnexpectedClosingBracket(1)));
        assert_eq!(parse("((a))"), Err(ParseError::NestedBracket(1)));
    }

    #[test]
    fn clean_reserved_strips_verbs() {
        assert_eq!(clean_reserved("type:book"), "BOOK");
        assert_eq!(clean_reserved("-lang:es"), "-ES");
        assert_eq!(clean_reserved("plain"), "PLAIN");
    }

    #[test]
    fn builds_one_object_per_group_and_field() {
        let query = SearchQuery::parse("ann -bot from:me, zoe").unwrap();
        let extra = FilterObject::new().with("last_connected", Condition::gte(10i32));
        let filter = query.to_filter(&["nick", "email"], &extra);

        assert_eq!(filter.len(), 4);
        assert_eq!(filter.objects()[0], FilterObject::new()
            .with("last_connected", Condition::gte(10i32))
            .with("nick", Condition::contains("ann"))
            .with("nick", Condition::contains("bot").not()));
        assert_eq!(filter.objects()[1].get("email").unwrap(), &[
            Condition::contains("ann"),
            Condition::contains("bot").not(),
        ]);
        assert_eq!(filter.objects()[3].get("email").unwrap(), &[Condition::contains("zoe")]);
    }

    #[test]
    fn empty_search_matches_everything_per_field() {
        let filter = SearchQuery::parse("").unwrap().to_filter(&["nick"], &FilterObject::new());

        assert_eq!(filter.len(), 1);
        assert!(filter.objects()[0].is_empty());
    }
}
