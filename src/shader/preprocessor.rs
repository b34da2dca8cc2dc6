//! Include Preprocessor
//!
//! Resolves `#pragma include "path"` / `#pragma include <path>` directives by
//! textual substitution, in place, before sources reach the driver.
//!
//! # Output shape
//!
//! ```text
//! #pragma include "common.glsl"      #line 1 1
//! float x;                     ==>   <contents of common.glsl>
//!                                    #line 1 0
//!                                    float x;
//! ```
//!
//! Every spliced file is wrapped in `#line` directives, so driver diagnostics
//! point at the file and line the text came from. Included text is scanned
//! again, which makes nested includes work; an end-of-file sentinel placed
//! after each inserted file pops the position stack when the scan reaches it.
//!
//! # Recovery
//!
//! Nothing in this pass fails. Malformed directives, loader failures and
//! exceeding the include limit are all replaced by a `#error` line, which the
//! driver reports with normal compile diagnostics.
//!
//! | Situation | Replacement |
//! |-----------|-------------|
//! | Missing or unterminated file name | `#error malformed include directive (...)` |
//! | Loader reports failure | `#error failed to load include file "<path>"` |
//! | More than `max_includes` includes | `#error include limit of N exceeded ...` |

use log::{debug, trace, warn};

use super::loader::IncludeLoader;
use crate::settings::{DEFAULT_MAX_INCLUDES, ShaderSettings};

/// Marks the end of an inserted file's text.
const END_OF_INCLUDE: char = '\u{1}';

/// Position inside one file of the include stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeFrame {
    /// Current line (1-based).
    pub line: u32,
    /// Source-string index used in `#line` directives.
    pub file: u32,
}

/// One performed include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRecord {
    /// Source-string index assigned to the included text.
    pub file_index: u32,
    pub path: String,
    /// File that contained the directive.
    pub parent_file: u32,
    /// Line of the directive in its file.
    pub line: u32,
}

/// Summary of one preprocessing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessReport {
    pub includes: Vec<IncludeRecord>,
    /// Number of `#error` lines substituted.
    pub errors: usize,
}

impl PreprocessReport {
    #[inline]
    #[must_use]
    pub fn include_count(&self) -> usize {
        self.includes.len()
    }

    /// Path of the file that was assigned `file_index`.
    #[must_use]
    pub fn source_name(&self, file_index: u32) -> Option<&str> {
        self.includes
            .iter()
            .find(|r| r.file_index == file_index)
            .map(|r| r.path.as_str())
    }

    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Code,
    LineComment,
    BlockComment,
}

enum Directive {
    /// Any other directive; left alone.
    Other,
    Include {
        path_start: usize,
        path_end: usize,
        end: usize,
    },
    Malformed {
        end: usize,
        reason: &'static str,
    },
}

/// `#pragma include` resolver. See the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludePreprocessor {
    max_includes: usize,
    first_file_index: u32,
}

impl Default for IncludePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl IncludePreprocessor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_includes: DEFAULT_MAX_INCLUDES,
            first_file_index: 1,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &ShaderSettings) -> Self {
        Self::new().with_max_includes(settings.max_includes)
    }

    /// Caps the number of includes per top-level source.
    #[must_use]
    pub fn with_max_includes(mut self, max_includes: usize) -> Self {
        self.max_includes = max_includes;
        self
    }

    /// Source-string index given to the first included file. Indices below it
    /// stay free for the caller's own `#line` annotations.
    #[must_use]
    pub fn with_first_file_index(mut self, index: u32) -> Self {
        self.first_file_index = index;
        self
    }

    #[inline]
    #[must_use]
    pub fn max_includes(&self) -> usize {
        self.max_includes
    }

    /// Resolves every include in `source`, in place.
    pub fn process(&self, source: &mut String, loader: &dyn IncludeLoader) -> PreprocessReport {
        let mut report = PreprocessReport::default();
        let mut frames = vec![IncludeFrame { line: 1, file: 0 }];
        let mut state = ScanState::Code;
        let mut line_start = true;
        let mut pos = 0;
        let mut content = String::new();

        while pos < source.len() {
            let bytes = source.as_bytes();
            let b = bytes[pos];
            let next = bytes.get(pos + 1).copied();

            match b {
                b'\n' | b'\r' => {
                    let pair = matches!((b, next), (b'\n', Some(b'\r')) | (b'\r', Some(b'\n')));
                    pos += if pair { 2 } else { 1 };
                    top(&mut frames).line += 1;
                    if state == ScanState::LineComment {
                        state = ScanState::Code;
                    }
                    line_start = true;
                }
                b'\\' if matches!(next, Some(b'\n' | b'\r')) => {
                    let after = bytes.get(pos + 2).copied();
                    let pair = matches!(
                        (next, after),
                        (Some(b'\n'), Some(b'\r')) | (Some(b'\r'), Some(b'\n'))
                    );
                    pos += if pair { 3 } else { 2 };
                    top(&mut frames).line += 1;
                }
                0x01 => {
                    if frames.len() > 1 {
                        frames.pop();
                        let parent = *top(&mut frames);
                        let restore = format!("#line {} {}\n", parent.line, parent.file);
                        source.replace_range(pos..=pos, &restore);
                        pos += restore.len();
                        trace!("Leaving include, back to {}:{}", parent.file, parent.line);
                    } else {
                        source.remove(pos);
                    }
                    state = ScanState::Code;
                    line_start = false;
                }
                _ => match state {
                    ScanState::LineComment => pos += 1,
                    ScanState::BlockComment => {
                        if b == b'*' && next == Some(b'/') {
                            state = ScanState::Code;
                            pos += 2;
                        } else {
                            pos += 1;
                        }
                    }
                    ScanState::Code => {
                        if b == b'/' && next == Some(b'/') {
                            state = ScanState::LineComment;
                            pos += 2;
                        } else if b == b'/' && next == Some(b'*') {
                            state = ScanState::BlockComment;
                            pos += 2;
                        } else if b == b'#' && line_start {
                            (pos, line_start) = self.directive(
                                source,
                                pos,
                                loader,
                                &mut frames,
                                &mut report,
                                &mut content,
                            );
                        } else {
                            if !is_blank(b) {
                                line_start = false;
                            }
                            pos += 1;
                        }
                    }
                },
            }
        }

        if report.include_count() > 0 || report.errors > 0 {
            debug!(
                "Preprocessed source: {} includes, {} errors",
                report.include_count(),
                report.errors
            );
        }
        report
    }

    /// Handles the directive starting at `hash`. Returns where scanning
    /// resumes and whether that position starts a line.
    fn directive(
        &self,
        source: &mut String,
        hash: usize,
        loader: &dyn IncludeLoader,
        frames: &mut Vec<IncludeFrame>,
        report: &mut PreprocessReport,
        content: &mut String,
    ) -> (usize, bool) {
        match parse_directive(source.as_bytes(), hash) {
            Directive::Other => {
                if let Some((line, file)) = parse_line_directive(&source[hash..]) {
                    let frame = top(frames);
                    // The counter advances on the directive's own line break.
                    frame.line = line.saturating_sub(1);
                    if let Some(file) = file {
                        frame.file = file;
                    }
                }
                (hash + 1, false)
            }
            Directive::Malformed { end, reason } => {
                let at = *top(frames);
                warn!(
                    "Malformed include directive at {}:{} ({reason})",
                    at.file, at.line
                );
                let error = format!("#error malformed include directive ({reason})");
                (substitute_error(source, hash..end, &error, at, report), false)
            }
            Directive::Include {
                path_start,
                path_end,
                end,
            } => {
                let path = source[path_start..path_end].to_string();

                if report.include_count() >= self.max_includes {
                    warn!(
                        "Include limit of {} exceeded while including \"{path}\"",
                        self.max_includes
                    );
                    let error = format!(
                        "#error include limit of {} exceeded while including \"{}\"",
                        self.max_includes,
                        sanitize(&path)
                    );
                    return (substitute_error(source, hash..end, &error, *top(frames), report), false);
                }

                content.clear();
                if !loader.load(&path, content) {
                    warn!("Failed to load include file \"{path}\"");
                    let error = format!("#error failed to load include file \"{}\"", sanitize(&path));
                    return (substitute_error(source, hash..end, &error, *top(frames), report), false);
                }
                content.retain(|c| c != END_OF_INCLUDE);

                let parent = *top(frames);
                let file_index = self.first_file_index + report.include_count() as u32;
                trace!(
                    "Including \"{path}\" as file {file_index} from {}:{}",
                    parent.file, parent.line
                );

                let header = format!("#line 1 {file_index}\n");
                let mut replacement = String::with_capacity(header.len() + content.len() + 2);
                replacement.push_str(&header);
                replacement.push_str(content);
                if !content.is_empty() && !content.ends_with(['\n', '\r']) {
                    replacement.push('\n');
                }
                if content.trim_end_matches(['\n', '\r']).ends_with('\\') {
                    // Ends the continuation so the restoring `#line` keeps its own line.
                    replacement.push('\n');
                }
                replacement.push(END_OF_INCLUDE);
                source.replace_range(hash..end, &replacement);

                report.includes.push(IncludeRecord {
                    file_index,
                    path,
                    parent_file: parent.file,
                    line: parent.line,
                });
                frames.push(IncludeFrame {
                    line: 1,
                    file: file_index,
                });
                (hash + header.len(), true)
            }
        }
    }
}

#[inline]
fn top(frames: &mut [IncludeFrame]) -> &mut IncludeFrame {
    // The root frame is pushed first and never popped.
    let last = frames.len() - 1;
    &mut frames[last]
}

fn substitute_error(
    source: &mut String,
    range: std::ops::Range<usize>,
    error: &str,
    at: IncludeFrame,
    report: &mut PreprocessReport,
) -> usize {
    let start = range.start;
    let trailing = source
        .as_bytes()
        .get(range.end)
        .is_some_and(|&b| !matches!(b, b'\n' | b'\r'));
    report.errors += 1;
    if trailing {
        // Text after the directive keeps its own line and its original number.
        let replacement = format!("{error}\n#line {} {}\n", at.line, at.file);
        source.replace_range(range, &replacement);
        start + replacement.len()
    } else {
        source.replace_range(range, error);
        start + error.len()
    }
}

/// Escapes `#` so a path cannot smuggle a directive into the error line.
fn sanitize(path: &str) -> String {
    path.replace('#', "%23")
}

#[inline]
fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | 0x0B | 0x0C)
}

#[inline]
fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_blanks(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && is_blank(bytes[i]) {
        i += 1;
    }
    i
}

/// End of the logical line (stops at a line break or sentinel).
fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| matches!(b, b'\n' | b'\r' | 0x01))
        .map_or(bytes.len(), |p| from + p)
}

fn parse_directive(bytes: &[u8], hash: usize) -> Directive {
    let mut i = skip_blanks(bytes, hash + 1);

    let Some(rest) = bytes.get(i..) else {
        return Directive::Other;
    };
    if !rest.starts_with(b"pragma") {
        return Directive::Other;
    }
    i += "pragma".len();
    let after_keyword = skip_blanks(bytes, i);
    if after_keyword == i {
        return Directive::Other;
    }
    i = after_keyword;

    let keyword_end = i + "include".len();
    if !bytes[i..].starts_with(b"include") || bytes.get(keyword_end).is_some_and(|&b| is_ident(b)) {
        return Directive::Other;
    }
    i = skip_blanks(bytes, keyword_end);

    let close = match bytes.get(i) {
        Some(b'"') => b'"',
        Some(b'<') => b'>',
        _ => {
            return Directive::Malformed {
                end: line_end(bytes, i),
                reason: "missing file name",
            };
        }
    };

    let path_start = i + 1;
    let limit = line_end(bytes, path_start);
    match bytes[path_start..limit].iter().position(|&b| b == close) {
        None => Directive::Malformed {
            end: limit,
            reason: "unterminated file name",
        },
        Some(0) => Directive::Malformed {
            end: path_start + 1,
            reason: "empty file name",
        },
        Some(len) => Directive::Include {
            path_start,
            path_end: path_start + len,
            end: path_start + len + 1,
        },
    }
}

/// Parses `# line N [F]` at the start of `text`.
fn parse_line_directive(text: &str) -> Option<(u32, Option<u32>)> {
    let body = text[1..].trim_start_matches([' ', '\t']);
    let args = body.strip_prefix("line")?;
    if !args.starts_with([' ', '\t']) {
        return None;
    }
    let end = args.find(['\n', '\r', '\u{1}']).unwrap_or(args.len());
    let mut words = args[..end].split_whitespace();
    let line = words.next()?.parse().ok()?;
    let file = match words.next() {
        Some(word) => Some(word.parse().ok()?),
        None => None,
    };
    Some((line, file))
}
