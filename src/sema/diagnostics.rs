// SPDX-License-Identifier: Apache-2.0

use super::ast::Namespace;
use codespan_reporting::{diagnostic, files, term};
use itertools::Itertools;
use solang_parser::pt::Loc;
use std::{
    collections::HashMap,
    io,
    slice::Iter,
    {fmt, sync::Arc},
};

#[derive(Debug, Eq, Hash, PartialOrd, Ord, PartialEq, Clone, Copy)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Level::Debug => write!(f, "debug"),
            Level::Info => write!(f, "info"),
            Level::Warning => write!(f, "warning"),
            Level::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Eq, Hash, PartialOrd, Ord, PartialEq, Clone, Copy)]
pub enum ErrorType {
    None,
    TypeError,
    /// The type cannot be represented in the flat felt model
    UnsupportedShape,
    Warning,
}

#[derive(Debug, Eq, Hash, PartialOrd, Ord, PartialEq, Clone)]
pub struct Note {
    pub loc: Loc,
    pub message: String,
}

#[derive(Debug, Eq, Hash, PartialOrd, Ord, PartialEq, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub ty: ErrorType,
    pub loc: Loc,
    pub message: String,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn unsupported(loc: Loc, message: String) -> Self {
        Diagnostic {
            level: Level::Error,
            ty: ErrorType::UnsupportedShape,
            loc,
            message,
            notes: Vec::new(),
        }
    }
}

#[derive(Default, Debug)]
pub struct Diagnostics {
    contents: Vec<Diagnostic>,
    has_error: bool,
}

impl Diagnostics {
    pub fn any_errors(&self) -> bool {
        self.has_error
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn iter(&self) -> Iter<Diagnostic> {
        self.contents.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if matches!(diagnostic.level, Level::Error) {
            self.has_error = true;
        }
        self.contents.push(diagnostic);
    }

    pub fn first_error(&self) -> String {
        match self.contents.iter().find(|m| m.level == Level::Error) {
            Some(m) => m.message.to_owned(),
            None => panic!("no errors found"),
        }
    }
}

fn convert_diagnostic(
    msg: &Diagnostic,
    file_id: &HashMap<usize, usize>,
) -> diagnostic::Diagnostic<usize> {
    let diagnostic = diagnostic::Diagnostic::new(match msg.level {
        Level::Debug => diagnostic::Severity::Help,
        Level::Info => diagnostic::Severity::Note,
        Level::Error => diagnostic::Severity::Error,
        Level::Warning => diagnostic::Severity::Warning,
    })
    .with_message(msg.message.to_owned());

    let mut labels = Vec::new();

    if let Loc::File(file_no, start, end) = msg.loc {
        if let Some(id) = file_id.get(&file_no) {
            labels.push(diagnostic::Label::primary(*id, start..end));
        }
    }

    for note in &msg.notes {
        if let Loc::File(file_no, start, end) = note.loc {
            if let Some(id) = file_id.get(&file_no) {
                labels.push(
                    diagnostic::Label::secondary(*id, start..end)
                        .with_message(note.message.to_owned()),
                );
            }
        }
    }

    if labels.is_empty() {
        diagnostic
    } else {
        diagnostic.with_labels(labels)
    }
}

impl Namespace {
    /// Render the diagnostics as plain text, one block per diagnostic
    pub fn diagnostics_in_plain(&self, debug: bool) -> String {
        let (files, file_id) = self.convert_files();

        let config = term::Config::default();

        self.diagnostics
            .iter()
            .filter(|msg| msg.level != Level::Debug || debug)
            .map(|msg| {
                let diagnostic = convert_diagnostic(msg, &file_id);

                let mut buffer = RawBuffer::new();

                // writing into a Vec cannot fail; a missing file only loses the snippet
                if term::emit(&mut buffer, &config, &files, &diagnostic).is_err() {
                    return format!("{}: {}", msg.level, msg.message);
                }

                buffer.into_string()
            })
            .join("\n")
    }

    fn convert_files(&self) -> (files::SimpleFiles<String, Arc<str>>, HashMap<usize, usize>) {
        let mut files = files::SimpleFiles::new();
        let mut file_id = HashMap::new();

        for (file_no, file) in self.files.iter().enumerate() {
            file_id.insert(file_no, files.add(format!("{file}"), file.contents.clone()));
        }

        (files, file_id)
    }
}

#[derive(Default)]
pub struct RawBuffer {
    buf: Vec<u8>,
}

impl RawBuffer {
    pub fn new() -> RawBuffer {
        RawBuffer::default()
    }

    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

impl io::Write for RawBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl term::termcolor::WriteColor for RawBuffer {
    fn supports_color(&self) -> bool {
        false
    }

    fn set_color(&mut self, _: &term::termcolor::ColorSpec) -> io::Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        Ok(())
    }
}
