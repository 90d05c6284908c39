//! Line oriented operator console

use std::fmt::Display;
use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: AsyncBufRead + Unpin, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, line: impl Display) -> io::Result<()> {
        writeln!(self.output, "{line}")
    }

    /// Print `question: ` and wait for one line; `None` once input is closed
    pub async fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}: ")?;
        self.output.flush()?;

        let mut answer = String::new();
        if self.input.read_line(&mut answer).await? == 0 {
            return Ok(None);
        }
        Ok(Some(answer.trim_end_matches(['\r', '\n']).to_string()))
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::Console;

    #[tokio::test]
    async fn ask_reads_one_line_at_a_time() {
        let mut console = Console::new(&b"Open\r\nsync\n"[..], Vec::new());
        assert_eq!(console.ask("Action").await.unwrap().as_deref(), Some("Open"));
        assert_eq!(console.ask("Action").await.unwrap().as_deref(), Some("sync"));
        assert_eq!(console.ask("Action").await.unwrap(), None);

        let output = String::from_utf8(console.into_output()).unwrap();
        assert_eq!(output, "Action: Action: Action: ");
    }
}
