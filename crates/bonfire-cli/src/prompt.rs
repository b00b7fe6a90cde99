//! # Stream Prompt
//!
//! Interactive stream selection on the terminal. The table and the prompt
//! go to stderr so stdout stays clean for results.

use std::io::{self, BufRead, IsTerminal, Write};

use bonfire_core::{Error, Stream, StreamPrompter};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct StreamRow {
    #[tabled(rename = "#")]
    index: usize,
    title: String,
    id: String,
}

pub fn stream_table(streams: &[Stream]) -> String {
    let rows = streams.iter().enumerate().map(|(index, s)| StreamRow {
        index,
        title: s.title.clone(),
        id: s.id.clone(),
    });
    Table::new(rows).with(Style::sharp()).to_string()
}

/// Reads the selection from stdin. Refuses to block when stdin is not a
/// terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl StreamPrompter for TerminalPrompter {
    fn ask(&mut self, streams: &[Stream]) -> bonfire_core::Result<String> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Err(Error::InteractiveInputRequired(
                "select a stream with --stream".into(),
            ));
        }

        let mut stderr = io::stderr().lock();
        writeln!(stderr, "Please select a stream to query:")?;
        writeln!(stderr, "{}", stream_table(streams))?;
        write!(stderr, "Enter stream number [0]: ")?;
        stderr.flush()?;

        let mut answer = String::new();
        stdin.lock().read_line(&mut answer)?;
        Ok(answer)
    }
}
