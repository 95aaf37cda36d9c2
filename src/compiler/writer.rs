/// Accumulates generated source one line at a time at the current indentation.
#[derive(Debug, Clone)]
pub struct CodeWriter {
    lines: Vec<String>,
    depth: usize,
    unit: &'static str,
}

impl CodeWriter {
    pub fn new(unit: &'static str) -> Self {
        Self {
            lines: Vec::new(),
            depth: 0,
            unit,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if text.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", self.unit.repeat(self.depth), text));
        }
    }

    pub fn blank(&mut self) {
        if self.lines.last().is_some_and(|l| !l.is_empty()) {
            self.lines.push(String::new());
        }
    }

    /// Appends pre-formatted lines (such as a fixed preamble) at the current depth.
    pub fn lines(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Writes `open`, runs `body` one level deeper, then writes `close` if given.
    pub fn block<T, E>(
        &mut self,
        open: impl AsRef<str>,
        close: Option<&str>,
        body: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        self.line(open);
        self.indent();
        let result = body(self);
        self.dedent();
        if let Some(close) = close {
            self.line(close);
        }
        result
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
