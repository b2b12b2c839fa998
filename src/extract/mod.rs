pub mod date;
pub mod wordcount;

/// One extraction strategy: a pure function over already-fetched content,
/// plus the tag reported when it produces the winning result. Both cascades
/// build their strategy lists from this type.
pub struct Strategy<'a, T> {
    pub tag: &'static str,
    run: Box<dyn Fn() -> Option<T> + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new(tag: &'static str, run: impl Fn() -> Option<T> + 'a) -> Self {
        Self {
            tag,
            run: Box::new(run),
        }
    }

    fn run(&self) -> Option<T> {
        (self.run)()
    }
}

/// A produced candidate with the strategy tag that made it.
pub struct Candidate<T> {
    pub value: T,
    pub tag: &'static str,
}

/// Fixed-priority cascade: run strategies in order, first success wins.
pub fn first_success<T>(strategies: &[Strategy<'_, T>]) -> Option<Candidate<T>> {
    strategies.iter().find_map(|s| {
        s.run().map(|value| Candidate {
            value,
            tag: s.tag,
        })
    })
}

/// Ranking cascade: run every strategy and keep all produced candidates in
/// strategy order, for a selection policy to rank.
pub fn collect_candidates<T>(strategies: &[Strategy<'_, T>]) -> Vec<Candidate<T>> {
    strategies
        .iter()
        .filter_map(|s| {
            s.run().map(|value| Candidate {
                value,
                tag: s.tag,
            })
        })
        .collect()
}
