/// Elements the writer has opened and still owes a close for, keyed by the
/// source depth they were opened at.
///
/// Closing is driven purely by depth: whenever traversal returns to a depth at
/// or above a pending entry, that entry is due. This keeps exactly one close per
/// open even when the source children of an element are skipped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CloseStack {
    pending: Vec<(usize, String)>,
}

impl CloseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, depth: usize, name: impl Into<String>) {
        self.pending.push((depth, name.into()));
    }

    /// Pop every pending element opened at `depth` or deeper, innermost first
    pub fn close_from(&mut self, depth: usize) -> Vec<String> {
        let mut closed = Vec::new();
        while let Some((d, _)) = self.pending.last() {
            if *d < depth {
                break;
            }
            if let Some((_, name)) = self.pending.pop() {
                closed.push(name);
            }
        }
        closed
    }

    /// Pop everything, innermost first
    pub fn close_all(&mut self) -> Vec<String> {
        self.close_from(0)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    enum Token {
        Open(usize, &'static str),
        Close(usize),
        Text(usize),
    }

    /// Replay a synthetic token stream, returning the sequence of names closed
    fn replay(tokens: &[Token]) -> (Vec<String>, CloseStack) {
        let mut stack = CloseStack::new();
        let mut closed = Vec::new();
        for token in tokens {
            match token {
                Token::Open(depth, name) => {
                    closed.extend(stack.close_from(*depth));
                    stack.push(*depth, *name);
                }
                Token::Close(depth) => closed.extend(stack.close_from(*depth)),
                Token::Text(depth) => closed.extend(stack.close_from(*depth + 1)),
            }
        }
        (closed, stack)
    }

    #[test]
    fn test_balanced() {
        let (closed, stack) = replay(&[
            Token::Open(1, "a"),
            Token::Open(2, "b"),
            Token::Text(2),
            Token::Close(2),
            Token::Open(2, "c"),
            Token::Close(2),
            Token::Close(1),
        ]);
        assert_eq!(closed, vec!["b", "c", "a"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_skipped_children_still_close_once() {
        // `b`'s own close event was never seen, e.g. its subtree was cut short;
        // opening the sibling `c` closes it
        let (closed, stack) = replay(&[
            Token::Open(1, "a"),
            Token::Open(2, "b"),
            Token::Open(3, "x"),
            Token::Open(2, "c"),
        ]);
        assert_eq!(closed, vec!["x", "b"]);
        assert_eq!(stack.len(), 2);

        let mut stack = stack;
        assert_eq!(stack.close_all(), vec!["c", "a"]);
    }

    #[test]
    fn test_text_closes_deeper_only() {
        let (closed, stack) = replay(&[
            Token::Open(1, "a"),
            Token::Open(2, "b"),
            Token::Text(1),
        ]);
        assert_eq!(closed, vec!["b"]);
        assert_eq!(stack.len(), 1);
    }
}
