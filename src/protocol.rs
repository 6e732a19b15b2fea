//! Wire vocabulary shared by server and client.
//!
//! There is no framing: a client message is whatever one `read` returns, and a reply is a
//! run of text chunks closed by [`SENTINEL`].

/// Largest chunk read from a socket in one call.
pub const CHUNK_SIZE: usize = 1024;

/// Marks the end of every reply.
pub const SENTINEL: &str = "END!!!";

pub const STOP_SERVER: &str = "STOP SERVER!";
pub const CLEAR_HISTORY: &str = "CLEAR HISTORY!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Stop,
    ClearHistory,
    Chat(String),
}

impl Command {
    /// Control strings match exactly; everything else, including near misses, is chat.
    pub fn parse(text: &str) -> Self {
        match text {
            STOP_SERVER => Command::Stop,
            CLEAR_HISTORY => Command::ClearHistory,
            other => Command::Chat(other.to_string()),
        }
    }
}

/// Output of one [`SentinelScanner::push`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Scan {
    pub text: String,
    pub finished: bool,
}

/// Finds the sentinel in a stream of decoded chunks.
///
/// An exact `"END!!!"` chunk is the normal case, but TCP may glue the sentinel onto the
/// last delta or split it across reads. The scanner holds back any tail that could still
/// grow into the sentinel and releases it once the next chunk proves otherwise.
#[derive(Debug, Default)]
pub struct SentinelScanner {
    pending: String,
    finished: bool,
}

impl SentinelScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, chunk: &str) -> Scan {
        if self.finished {
            return Scan { text: String::new(), finished: true };
        }
        self.pending.push_str(chunk);

        if let Some(at) = self.pending.find(SENTINEL) {
            self.pending.truncate(at);
            self.finished = true;
            return Scan { text: std::mem::take(&mut self.pending), finished: true };
        }

        let hold = (1..SENTINEL.len())
            .rev()
            .find(|&k| self.pending.ends_with(&SENTINEL[..k]))
            .unwrap_or(0);
        // SENTINEL is ASCII, so the held suffix starts on a char boundary.
        let keep = self.pending.split_off(self.pending.len() - hold);
        let text = std::mem::replace(&mut self.pending, keep);
        Scan { text, finished: false }
    }

    /// Whatever was held back when the stream ended without a sentinel.
    pub fn into_remainder(self) -> String {
        self.pending
    }
}
