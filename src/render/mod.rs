//! Line-oriented page rendering.
//!
//! Every physical line of a page becomes one addressable block, numbered
//! from 1 in a single pass:
//!
//! ```text
//! A                 <div class="line" id="1">A</div>
//! #|printf 'X\nY'   <div class="line macro" id="2"><div>X</div><div>Y</div></div>
//! - [x] B           <div class="line" id="3"><input type="checkbox" ... checked> B</div>
//! ```
//!
//! A directive expands to as many inner blocks as its command prints, but
//! consumes a single line number, so block ids always match source lines
//! and an editor can address the file by them.
//!
//! Rendering is all or nothing: a read error or a failing directive aborts
//! the page and nothing is returned.

pub mod command;
mod error;
mod html;
pub mod line;

pub use command::{CommandRunner, ShellRunner};
pub use error::{MacroError, RenderError};
pub use html::escape;

use crate::config::RenderConfig;
use line::{LineKind, classify};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
};

/// Renders page sources into HTML fragments.
#[derive(Clone)]
pub struct Renderer {
    runner: Arc<dyn CommandRunner>,
    escape_html: bool,
}

impl Renderer {
    pub fn new(runner: Arc<dyn CommandRunner>, escape_html: bool) -> Self {
        Self {
            runner,
            escape_html,
        }
    }

    /// Renderer using the configured shell.
    pub fn from_config(config: &RenderConfig) -> Self {
        Self::new(
            Arc::new(ShellRunner::new(config.shell.iter().cloned())),
            config.escape_html,
        )
    }

    /// Render a file; directives run in the file's directory.
    pub fn render_file(&self, path: &Path) -> Result<String, RenderError> {
        let file = File::open(path)?;
        self.render(BufReader::new(file), working_dir(path))
    }

    /// Render a page read from `input`; directives run in `dir`.
    pub fn render(&self, mut input: impl BufRead, dir: &Path) -> Result<String, RenderError> {
        let mut out = String::new();
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let line = String::from_utf8_lossy(&buf);
            self.render_line(&mut out, line_no, &line, dir)?;
        }

        Ok(out)
    }

    fn render_line(
        &self,
        out: &mut String,
        line_no: usize,
        line: &str,
        dir: &Path,
    ) -> Result<(), RenderError> {
        match classify(line) {
            LineKind::Macro(command) => {
                let output = self
                    .runner
                    .run(command, dir)
                    .map_err(|source| RenderError::Macro {
                        line: line_no,
                        source,
                    })?;

                html::open_line(out, line_no, Some("macro"));
                for output_line in output.lines() {
                    out.push_str("<div>");
                    out.push_str(&self.inline(output_line));
                    out.push_str("</div>");
                }
            }
            LineKind::Task {
                indent,
                state,
                text,
            } => {
                html::open_line(out, line_no, None);
                html::task(out, line_no, indent, state, &self.inline(text));
            }
            LineKind::Heading(text) => {
                html::open_line(out, line_no, None);
                html::heading(out, &self.inline(text));
            }
            LineKind::Plain(text) => {
                html::open_line(out, line_no, None);
                out.push_str(&self.inline(text));
            }
        }
        html::close_line(out);

        Ok(())
    }

    fn inline(&self, text: &str) -> String {
        html::inline(text, self.escape_html)
    }
}

/// Directory a page's directives run in. A bare name like `todo.txt` has
/// an empty parent, which is not a valid working directory.
fn working_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::{
        io::{self, Cursor, Read},
        path::PathBuf,
    };
    use tempfile::TempDir;

    /// Answers directives from a fixed table and records each call.
    #[derive(Default)]
    struct FakeRunner {
        outputs: Vec<(&'static str, Result<&'static str, i32>)>,
        calls: Mutex<Vec<(String, PathBuf)>>,
    }

    impl FakeRunner {
        fn with(outputs: Vec<(&'static str, Result<&'static str, i32>)>) -> Arc<Self> {
            Arc::new(Self {
                outputs,
                calls: Mutex::default(),
            })
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, command: &str, dir: &Path) -> Result<String, MacroError> {
            self.calls.lock().push((command.to_owned(), dir.to_path_buf()));
            let result = self
                .outputs
                .iter()
                .find(|(c, _)| *c == command)
                .map(|(_, r)| *r)
                .unwrap_or(Ok(""));
            match result {
                Ok(out) => Ok(out.to_owned()),
                Err(code) => {
                    use std::os::unix::process::ExitStatusExt;
                    Err(MacroError::Exit {
                        command: command.to_owned(),
                        status: std::process::ExitStatus::from_raw(code << 8),
                    })
                }
            }
        }
    }

    fn render_str(runner: Arc<FakeRunner>, input: &str) -> Result<String, RenderError> {
        Renderer::new(runner, true).render(Cursor::new(input), Path::new("/wiki/notes"))
    }

    fn block_count(html: &str) -> usize {
        html.matches(r#"<div class="line"#).count()
    }

    #[test]
    fn test_one_block_per_line() {
        let html = render_str(FakeRunner::with(vec![]), "a\nb\n\nc\n").unwrap();
        assert_eq!(block_count(&html), 4);
        assert_eq!(
            html,
            concat!(
                r#"<div class="line" id="1">a</div>"#,
                r#"<div class="line" id="2">b</div>"#,
                r#"<div class="line" id="3"></div>"#,
                r#"<div class="line" id="4">c</div>"#,
            )
        );
    }

    #[test]
    fn test_final_line_without_terminator() {
        let html = render_str(FakeRunner::with(vec![]), "a\nlast").unwrap();
        assert_eq!(block_count(&html), 2);
        assert!(html.ends_with(r#"<div class="line" id="2">last</div>"#));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(render_str(FakeRunner::with(vec![]), "").unwrap(), "");
    }

    #[test]
    fn test_crlf_terminators() {
        let html = render_str(FakeRunner::with(vec![]), "a\r\nb\r\n").unwrap();
        assert_eq!(
            html,
            r#"<div class="line" id="1">a</div><div class="line" id="2">b</div>"#
        );
    }

    #[test]
    fn test_macro_expansion_keeps_order_and_number() {
        let runner = FakeRunner::with(vec![("cmd", Ok("X\nY\n"))]);
        let html = render_str(runner.clone(), "A\n#|cmd\nB\n").unwrap();

        assert_eq!(
            html,
            concat!(
                r#"<div class="line" id="1">A</div>"#,
                r#"<div class="line macro" id="2"><div>X</div><div>Y</div></div>"#,
                r#"<div class="line" id="3">B</div>"#,
            )
        );
        assert_eq!(
            *runner.calls.lock(),
            vec![("cmd".to_owned(), PathBuf::from("/wiki/notes"))]
        );
    }

    #[test]
    fn test_macro_output_is_plain_text() {
        let runner = FakeRunner::with(vec![("ls", Ok("# not a heading\n<b>[a](/a)\n"))]);
        let html = render_str(runner, "#|ls").unwrap();
        assert_eq!(
            html,
            concat!(
                r#"<div class="line macro" id="1">"#,
                r#"<div># not a heading</div>"#,
                r#"<div>&lt;b&gt;<a href="/a">a</a></div>"#,
                r#"</div>"#,
            )
        );
    }

    #[test]
    fn test_macro_without_output() {
        let html = render_str(FakeRunner::with(vec![]), "#|true\nnext").unwrap();
        assert_eq!(
            html,
            r#"<div class="line macro" id="1"></div><div class="line" id="2">next</div>"#
        );
    }

    #[test]
    fn test_macro_failure_aborts() {
        let runner = FakeRunner::with(vec![("false", Err(1))]);
        let err = render_str(runner, "a\n#|false\nb\n").unwrap_err();
        match err {
            RenderError::Macro { line, source } => {
                assert_eq!(line, 2);
                assert!(matches!(source, MacroError::Exit { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_task_lines() {
        let runner = FakeRunner::with(vec![]);
        let unchecked = render_str(runner.clone(), "- [ ] buy milk").unwrap();
        let checked = render_str(runner, "- [x] buy milk").unwrap();

        assert_eq!(
            unchecked,
            r#"<div class="line" id="1"><input type="checkbox" class="task" data-line="1"> buy milk</div>"#
        );
        assert_eq!(
            checked,
            r#"<div class="line" id="1"><input type="checkbox" class="task" data-line="1" checked> buy milk</div>"#
        );
    }

    #[test]
    fn test_heading_line() {
        let html = render_str(FakeRunner::with(vec![]), "# # Title\n").unwrap();
        assert_eq!(
            html,
            r#"<div class="line" id="1"><span class="heading">Title</span></div>"#
        );
    }

    #[test]
    fn test_links_in_every_kind() {
        let runner = FakeRunner::with(vec![]);
        let anchor = r#"<a href="http://x/y">docs</a>"#;

        let plain = render_str(runner.clone(), "see [docs](http://x/y)").unwrap();
        let heading = render_str(runner.clone(), "# see [docs](http://x/y)").unwrap();
        let task = render_str(runner, "- [ ] see [docs](http://x/y)").unwrap();

        assert_eq!(plain, format!(r#"<div class="line" id="1">see {anchor}</div>"#));
        assert!(heading.contains(&format!(r#"<span class="heading">see {anchor}</span>"#)));
        assert!(task.contains(&format!("> see {anchor}")));
    }

    #[test]
    fn test_escaping_can_be_disabled() {
        let html = Renderer::new(FakeRunner::with(vec![]), false)
            .render(Cursor::new("<em>hi</em>"), Path::new("."))
            .unwrap();
        assert_eq!(html, r#"<div class="line" id="1"><em>hi</em></div>"#);
    }

    #[test]
    fn test_render_is_idempotent() {
        let input = "# Title\n- [x] done\n#|cmd\nsee [a](/a)\ntail";
        let runner = FakeRunner::with(vec![("cmd", Ok("out\n"))]);
        let first = render_str(runner.clone(), input).unwrap();
        let second = render_str(runner, input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let input: &[u8] = b"ok\n\xff\xfe\n";
        let html = Renderer::new(FakeRunner::with(vec![]), true)
            .render(input, Path::new("."))
            .unwrap();
        assert_eq!(block_count(&html), 2);
        assert!(html.contains('\u{FFFD}'));
    }

    #[test]
    fn test_read_error_aborts() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }
        }
        let result = Renderer::new(FakeRunner::with(vec![]), true)
            .render(io::BufReader::new(Broken), Path::new("."));
        assert!(matches!(result, Err(RenderError::Io(_))));
    }

    #[test]
    fn test_render_file_runs_macros_in_file_dir() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("data"), "from data\n").unwrap();
        std::fs::write(sub.join("page.txt"), "#|cat data\n").unwrap();

        let renderer = Renderer::new(Arc::new(ShellRunner::new(["sh", "-c"])), true);
        let html = renderer.render_file(&sub.join("page.txt")).unwrap();
        assert_eq!(
            html,
            r#"<div class="line macro" id="1"><div>from data</div></div>"#
        );
    }

    #[test]
    fn test_working_dir_of_bare_relative_name() {
        assert_eq!(working_dir(Path::new("todo.txt")), Path::new("."));
        assert_eq!(working_dir(Path::new("notes/todo.txt")), Path::new("notes"));
        assert_eq!(working_dir(Path::new("/wiki/todo.txt")), Path::new("/wiki"));
    }

    #[test]
    fn test_macro_runs_in_dot_for_bare_relative_name() {
        let runner = FakeRunner::with(vec![("echo hi", Ok("hi\n"))]);
        let html = Renderer::new(runner.clone(), true)
            .render(Cursor::new("#|echo hi\n"), working_dir(Path::new("page.txt")))
            .unwrap();
        assert_eq!(html, r#"<div class="line macro" id="1"><div>hi</div></div>"#);
        assert_eq!(
            *runner.calls.lock(),
            vec![("echo hi".to_owned(), PathBuf::from("."))]
        );

        // a real shell accepts `.` as its working directory
        let out = ShellRunner::new(["sh", "-c"])
            .run("echo hi", working_dir(Path::new("page.txt")))
            .unwrap();
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn test_render_file_missing() {
        let renderer = Renderer::new(FakeRunner::with(vec![]), true);
        let result = renderer.render_file(Path::new("/definitely/not/here.txt"));
        assert!(matches!(result, Err(RenderError::Io(_))));
    }
}
