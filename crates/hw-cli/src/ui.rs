use std::io::{self, BufRead, Write};

/// Prints `prompt` and reads one trimmed line from stdin.
pub fn prompt_line(prompt: &str) -> io::Result<String> {
    ask(prompt, &mut io::stdin().lock(), &mut io::stdout().lock())
}

fn ask(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<String> {
    write!(output, "{prompt}")?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stdin closed before an answer was given",
        ));
    }
    Ok(answer.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn answer_is_trimmed_and_prompt_echoed() {
        let mut output = Vec::new();
        let answer = ask("Select: ", &mut Cursor::new("  2 \nrest"), &mut output).unwrap();
        assert_eq!(answer, "2");
        assert_eq!(output, b"Select: ");
    }

    #[test]
    fn closed_input_is_an_error() {
        let err = ask("Select: ", &mut Cursor::new(""), &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
