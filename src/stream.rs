/// Turns the cumulative text yielded by generation into wire deltas.
///
/// Only the suffix past the previous yield is returned. A yield that did not grow (or
/// whose cut would land inside a character) produces an empty delta.
#[derive(Debug, Default)]
pub struct DeltaEmitter {
    previous: String,
}

impl DeltaEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance<'a>(&mut self, current: &'a str) -> &'a str {
        let delta = if current.len() > self.previous.len() {
            current.get(self.previous.len()..).unwrap_or("")
        } else {
            ""
        };
        self.previous.clear();
        self.previous.push_str(current);
        delta
    }

    /// Last cumulative text seen, i.e. the full reply once generation is over.
    pub fn text(&self) -> &str {
        &self.previous
    }

    pub fn into_text(self) -> String {
        self.previous
    }
}
