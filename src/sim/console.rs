use std::cell::RefCell;
use std::io::{self, BufRead, Cursor, Write};
use std::rc::Rc;

use super::error::{Error, Res};

// Rule
// Printr / Printm write one decimal value followed by a newline.
// Input reads one line and parses it as an unsigned 32-bit value.
pub struct Console {
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Console {
    pub fn new(input: Box<dyn BufRead>, output: Box<dyn Write>) -> Console {
        Console { input, output }
    }

    pub fn stdio() -> Console {
        Console::new(Box::new(io::BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    /// A console fed from `input` whose output is kept in memory.
    pub fn capture(input: &str) -> (Console, Transcript) {
        let transcript = Transcript::default();
        let console = Console::new(
            Box::new(Cursor::new(input.as_bytes().to_vec())),
            Box::new(transcript.clone()),
        );
        (console, transcript)
    }

    pub fn write_value(&mut self, value: u32) -> Res<()> {
        writeln!(self.output, "{}", value)?;
        self.output.flush()?;
        Ok(())
    }

    pub fn read_value(&mut self) -> Res<u32> {
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let line = line.trim();
        line.parse::<u32>()
            .map_err(|_| Error::Input(line.to_string()))
    }
}

/// Shared in-memory sink for console output.
#[derive(Clone, Default)]
pub struct Transcript {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl Transcript {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for Transcript {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
