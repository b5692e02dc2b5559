use std::io::{BufRead, Write};

use miette::{Error, IntoDiagnostic, WrapErr};
use tracing::debug;

use crate::parse::{Parser, read_line};

/// Parse and evaluate a single line. `None` means the line was empty.
pub fn eval_line(filename: Option<&str>, line: &str) -> Result<Option<i64>, Error> {
    let Some(expr) = Parser::new(filename, line).parse_line()? else {
        return Ok(None);
    };
    let value = expr.evaluate()?;
    debug!(%expr, value, "evaluated");
    Ok(Some(value))
}

/// Read-evaluate-print loop over a line-oriented source.
///
/// Each line prints either `= <value>` or `error: <message>`; an empty line
/// or the end of the source ends the session. Only I/O failures stop it early.
pub struct Session<R, W> {
    source: R,
    sink: W,
    prompt: String,
    filename: Option<String>,
    report: bool,
    lines: usize,
}

impl<R: BufRead, W: Write> Session<R, W> {
    pub fn new(source: R, sink: W) -> Self {
        Session {
            source,
            sink,
            prompt: "> ".to_string(),
            filename: None,
            report: false,
            lines: 0,
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Name shown in diagnostics.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Also write the full diagnostic of every failed line to stderr.
    pub fn report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    pub fn lines_read(&self) -> usize {
        self.lines
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    pub fn run(&mut self) -> Result<(), Error> {
        loop {
            write!(self.sink, "{}", self.prompt)
                .and_then(|()| self.sink.flush())
                .into_diagnostic()
                .wrap_err("writing prompt failed")?;

            let line = read_line(&mut self.source)
                .wrap_err_with(|| format!("reading line {} failed", self.lines + 1))?;
            self.lines += 1;

            let outcome = eval_line(self.filename.as_deref(), &line);
            let written = match outcome {
                Ok(None) => {
                    debug!(line = self.lines, "end of session");
                    return Ok(());
                }
                Ok(Some(value)) => writeln!(self.sink, "= {value}"),
                Err(e) => {
                    debug!(line = self.lines, error = %e, "line failed");
                    if self.report {
                        eprintln!("{e:?}");
                    }
                    writeln!(self.sink, "error: {e}")
                }
            };
            written.into_diagnostic().wrap_err("writing result failed")?;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn transcript(input: &str) -> String {
        let mut session = Session::new(Cursor::new(input.to_string()), Vec::new()).prompt("");
        session.run().unwrap();
        String::from_utf8(session.into_sink()).unwrap()
    }

    #[test]
    fn prints_results_until_empty_line() {
        assert_eq!(transcript("1+2\n2*3\n\n4\n"), "= 3\n= 6\n");
    }

    #[test]
    fn errors_do_not_end_the_session() {
        assert_eq!(
            transcript("1+2@3\n(1+2\n10/0\n5\n"),
            "error: invalid character '@'\n\
             error: invalid token sequence\n\
             error: division by zero\n\
             = 5\n"
        );
    }

    #[test]
    fn prompt_is_written_before_every_read() {
        let mut session = Session::new(Cursor::new("7\n"), Vec::new());
        session.run().unwrap();
        assert_eq!(session.lines_read(), 2);
        assert_eq!(String::from_utf8(session.into_sink()).unwrap(), "> = 7\n> ");
    }

    #[test]
    fn last_line_without_newline() {
        assert_eq!(transcript("9-4"), "= 5\n");
    }

    #[test]
    fn eval_line_without_session() {
        assert_eq!(eval_line(None, "  1 +  2  ").unwrap(), Some(3));
        assert_eq!(eval_line(None, "").unwrap(), None);
    }
}
