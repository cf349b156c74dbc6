//! Output buffer
//!
//! An append-only text accumulator with a *retroactive insertion cursor*: while
//! the cursor is set, writes land at the remembered position instead of the end,
//! which lets a clause be emitted before text that was produced earlier (the
//! `SELECT` list in front of `FROM .. WHERE ..`, a join in front of `WHERE`).
//! Every write returns how many bytes it inserted so callers holding positions
//! further right can compensate.
//!
//! [`workflow`] builds on it to emit a combining token only when both operands
//! actually produced text.

mod parameters;

pub use parameters::ParameterMap;

/// A growable SQL text with an optional pending insertion offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlBuffer {
    text: String,
    insert_at: Option<usize>,
}

impl SqlBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            insert_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn insertion_point(&self) -> Option<usize> {
        self.insert_at
    }

    /// `None` switches back to append-only.
    pub fn set_insertion_point(&mut self, at: Option<usize>) {
        self.insert_at = at.map(|pos| pos.min(self.text.len()));
    }

    /// Where the next [`write`](Self::write) lands.
    pub fn position(&self) -> usize {
        self.insert_at.unwrap_or(self.text.len())
    }

    /// Writes at the insertion cursor (advancing it) or appends.
    pub fn write(&mut self, s: &str) -> usize {
        match self.insert_at {
            Some(pos) => {
                self.text.insert_str(pos, s);
                self.insert_at = Some(pos + s.len());
            }
            None => self.text.push_str(s),
        }
        s.len()
    }

    /// Inserts at an explicit earlier position. A pending cursor at or after
    /// `pos` is shifted so it keeps pointing at the same text.
    pub fn write_at(&mut self, pos: usize, s: &str) -> usize {
        let pos = pos.min(self.text.len());
        self.text.insert_str(pos, s);
        if let Some(cursor) = self.insert_at {
            if cursor >= pos {
                self.insert_at = Some(cursor + s.len());
            }
        }
        log::trace!("buffer insert at {}: {:?}", pos, s);
        s.len()
    }

    /// Removes `start..end` and returns it; the cursor is compensated.
    pub fn cut(&mut self, start: usize, end: usize) -> String {
        let end = end.min(self.text.len());
        let start = start.min(end);
        let removed: String = self.text.drain(start..end).collect();
        if let Some(cursor) = self.insert_at {
            if cursor >= end {
                self.insert_at = Some(cursor - removed.len());
            } else if cursor > start {
                self.insert_at = Some(start);
            }
        }
        removed
    }

    /// Replaces `start..end` with `s`, returning the signed length delta.
    pub fn replace_range(&mut self, start: usize, end: usize, s: &str) -> isize {
        let removed = self.cut(start, end);
        self.write_at(start, s);
        s.len() as isize - removed.len() as isize
    }

    pub fn slice(&self, start: usize, end: usize) -> &str {
        &self.text[start.min(self.text.len())..end.min(self.text.len())]
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Which of the writer's two cursors a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    Main,
    OrderBy,
}

/// The statement text plus the parallel order-by text.
#[derive(Debug, Clone, Default)]
pub struct SqlWriter {
    main: SqlBuffer,
    order_by: SqlBuffer,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, cursor: Cursor) -> &SqlBuffer {
        match cursor {
            Cursor::Main => &self.main,
            Cursor::OrderBy => &self.order_by,
        }
    }

    pub fn buffer_mut(&mut self, cursor: Cursor) -> &mut SqlBuffer {
        match cursor {
            Cursor::Main => &mut self.main,
            Cursor::OrderBy => &mut self.order_by,
        }
    }

    pub fn main(&self) -> &SqlBuffer {
        &self.main
    }

    pub fn main_mut(&mut self) -> &mut SqlBuffer {
        &mut self.main
    }

    /// Replaces the order-by text.
    pub fn set_order_by(&mut self, text: &str) {
        self.order_by = SqlBuffer::from_text(text);
    }

    pub fn order_by(&self) -> &str {
        self.order_by.as_str()
    }

    /// Writes `SELECT ...` (or anything else) in front of what has been written.
    pub fn prepend(&mut self, text: &str) -> usize {
        let saved = self.main.insertion_point();
        self.main.set_insertion_point(Some(0));
        let n = self.main.write(text);
        self.main.set_insertion_point(saved.map(|p| p + n));
        n
    }

    pub fn into_parts(self) -> (String, String) {
        (self.main.into_string(), self.order_by.into_string())
    }
}

/// Anything that renders into a [`SqlBuffer`].
pub trait BufferHost {
    fn buffer(&mut self) -> &mut SqlBuffer;
}

impl BufferHost for SqlBuffer {
    fn buffer(&mut self) -> &mut SqlBuffer {
        self
    }
}

/// Result of a [`workflow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// Both operands rendered; the joiner sits between them.
    Combined,
    /// The right operand rendered nothing; the left was not visited.
    Aborted,
    /// The left operand rendered nothing; the right operand's text was erased.
    Collapsed,
}

impl Workflow {
    pub fn is_combined(self) -> bool {
        self == Workflow::Combined
    }
}

/// Deferred syntax insertion.
///
/// 1. remember the write position and the cursor;
/// 2. render the right operand;
/// 3. if nothing was written, stop;
/// 4. move the cursor back to the remembered position and render the left operand;
/// 5. if the left wrote nothing, erase the right operand's text and stop;
/// 6. insert `joiner` between the two and restore the outer cursor, shifted by
///    everything inserted.
pub fn workflow<H, E>(
    host: &mut H,
    joiner: &str,
    right: impl FnOnce(&mut H) -> Result<(), E>,
    left: impl FnOnce(&mut H) -> Result<(), E>,
) -> Result<Workflow, E>
where
    H: BufferHost,
{
    let (mark, saved, start_len) = {
        let buf = host.buffer();
        (buf.position(), buf.insertion_point(), buf.len())
    };

    right(host)?;
    let right_len = host.buffer().len() - start_len;
    if right_len == 0 {
        host.buffer().set_insertion_point(saved);
        return Ok(Workflow::Aborted);
    }

    host.buffer().set_insertion_point(Some(mark));
    left(host)?;
    let buf = host.buffer();
    let left_len = buf.len() - start_len - right_len;
    if left_len == 0 {
        buf.cut(mark, mark + right_len);
        buf.set_insertion_point(saved);
        return Ok(Workflow::Collapsed);
    }

    let joiner_len = buf.write_at(mark + left_len, joiner);
    buf.set_insertion_point(saved.map(|_| mark + left_len + joiner_len + right_len));
    Ok(Workflow::Combined)
}

/// Renders `inner` and surrounds it with `open`/`close` only if it wrote anything.
pub fn wrap_non_empty<H, E>(
    host: &mut H,
    open: &str,
    close: &str,
    inner: impl FnOnce(&mut H) -> Result<(), E>,
) -> Result<bool, E>
where
    H: BufferHost,
{
    let (mark, start_len) = {
        let buf = host.buffer();
        (buf.position(), buf.len())
    };
    inner(host)?;
    let buf = host.buffer();
    if buf.len() == start_len {
        return Ok(false);
    }
    buf.write_at(mark, open);
    buf.write(close);
    Ok(true)
}
