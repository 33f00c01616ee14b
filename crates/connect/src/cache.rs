//! Streaming market-state cache: order books with sequence gating,
//! last-known tickers, bounded trade rings.
//!
//! Writers are the session tasks; readers are callers on any thread.
//! Each symbol has its own lock so one hot book never blocks reads of
//! another.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use hermes_core::{BookLevel, BookUpdate, Price, Quantity, Symbol, TickerSnapshot, Trade};

/// What happened to a book event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Sequence at or below what the book already holds, dropped
    Stale,
    /// Book cannot continue from here, caller must re-request a snapshot
    NeedsResync,
}

#[derive(Debug, Default)]
struct BookState {
    bids: BTreeMap<Price, Quantity>,
    asks: BTreeMap<Price, Quantity>,
    last_sequence: u64,
    initialized: bool,
}

impl BookState {
    fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_sequence = 0;
        self.initialized = false;
    }

    fn apply_levels(&mut self, update: &BookUpdate) {
        for level in &update.bids {
            if level.size.is_zero() {
                self.bids.remove(&level.price);
            } else {
                self.bids.insert(level.price, level.size);
            }
        }
        for level in &update.asks {
            if level.size.is_zero() {
                self.asks.remove(&level.price);
            } else {
                self.asks.insert(level.price, level.size);
            }
        }
    }

    fn is_crossed(&self) -> bool {
        match (self.bids.last_key_value(), self.asks.first_key_value()) {
            (Some((best_bid, _)), Some((best_ask, _))) => best_bid >= best_ask,
            _ => false,
        }
    }
}

#[derive(Default)]
struct SymbolEntry {
    book: BookState,
    ticker: Option<TickerSnapshot>,
    trades: VecDeque<Trade>,
    stale: bool,
}

/// Read view of an order book, bids best-first, asks best-first
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookView {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub sequence: u64,
    pub stale: bool,
}

impl OrderBookView {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }
}

/// Read view of the last ticker seen for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct TickerView {
    pub ticker: TickerSnapshot,
    pub stale: bool,
}

/// Read view of recent trades, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct TradesView {
    pub trades: Vec<Trade>,
    pub stale: bool,
}

/// Per-venue market-state cache fed by a session task
pub struct StreamCache {
    entries: DashMap<Symbol, Arc<RwLock<SymbolEntry>>>,
    trade_capacity: usize,
}

impl StreamCache {
    pub fn new(trade_capacity: usize) -> Self {
        StreamCache {
            entries: DashMap::new(),
            trade_capacity: trade_capacity.max(1),
        }
    }

    fn entry(&self, symbol: &Symbol) -> Arc<RwLock<SymbolEntry>> {
        self.entries
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SymbolEntry::default())))
            .value()
            .clone()
    }

    /// Replace the whole book and clear staleness.
    ///
    /// A snapshot that arrives crossed is as unusable as a crossed
    /// delta: the book is discarded and the caller must re-request.
    pub fn apply_book_snapshot(&self, symbol: &Symbol, update: &BookUpdate) -> ApplyOutcome {
        let entry = self.entry(symbol);
        let mut guard = entry.write();
        guard.book.reset();
        guard.book.apply_levels(update);

        if guard.book.is_crossed() {
            tracing::warn!(symbol = %symbol, sequence = update.sequence, "crossed snapshot, discarding");
            guard.book.reset();
            guard.stale = true;
            return ApplyOutcome::NeedsResync;
        }

        guard.book.last_sequence = update.sequence;
        guard.book.initialized = true;
        guard.stale = false;
        ApplyOutcome::Applied
    }

    /// Apply an incremental delta, gated on sequence order.
    ///
    /// A delta against an uninitialized book, or one that leaves the
    /// book crossed, invalidates the book and returns `NeedsResync`.
    pub fn apply_book_delta(&self, symbol: &Symbol, update: &BookUpdate) -> ApplyOutcome {
        let entry = self.entry(symbol);
        let mut guard = entry.write();

        if !guard.book.initialized {
            return ApplyOutcome::NeedsResync;
        }
        if update.sequence <= guard.book.last_sequence {
            return ApplyOutcome::Stale;
        }

        guard.book.apply_levels(update);
        guard.book.last_sequence = update.sequence;

        if guard.book.is_crossed() {
            tracing::warn!(symbol = %symbol, sequence = update.sequence, "book crossed, discarding");
            guard.book.reset();
            guard.stale = true;
            return ApplyOutcome::NeedsResync;
        }

        guard.stale = false;
        ApplyOutcome::Applied
    }

    /// Replace the ticker wholesale; fields the venue omitted become None
    pub fn apply_ticker(&self, symbol: &Symbol, ticker: TickerSnapshot) {
        let entry = self.entry(symbol);
        let mut guard = entry.write();
        guard.ticker = Some(ticker);
        guard.stale = false;
    }

    /// Append a trade, evicting the oldest past capacity
    pub fn apply_trade(&self, symbol: &Symbol, trade: Trade) {
        let entry = self.entry(symbol);
        let mut guard = entry.write();
        if guard.trades.len() == self.trade_capacity {
            guard.trades.pop_front();
        }
        guard.trades.push_back(trade);
        guard.stale = false;
    }

    /// Current book for a symbol, `None` until a snapshot has landed
    pub fn order_book(&self, symbol: &Symbol) -> Option<OrderBookView> {
        let entry = self.entries.get(symbol)?.value().clone();
        let guard = entry.read();
        if !guard.book.initialized {
            return None;
        }
        Some(OrderBookView {
            bids: guard
                .book
                .bids
                .iter()
                .rev()
                .map(|(p, s)| BookLevel { price: *p, size: *s })
                .collect(),
            asks: guard
                .book
                .asks
                .iter()
                .map(|(p, s)| BookLevel { price: *p, size: *s })
                .collect(),
            sequence: guard.book.last_sequence,
            stale: guard.stale,
        })
    }

    /// Last ticker for a symbol, `None` until one has arrived
    pub fn ticker(&self, symbol: &Symbol) -> Option<TickerView> {
        let entry = self.entries.get(symbol)?.value().clone();
        let guard = entry.read();
        guard.ticker.clone().map(|ticker| TickerView {
            ticker,
            stale: guard.stale,
        })
    }

    /// Recent trades for a symbol, oldest first
    pub fn trades(&self, symbol: &Symbol) -> Option<TradesView> {
        let entry = self.entries.get(symbol)?.value().clone();
        let guard = entry.read();
        if guard.trades.is_empty() {
            return None;
        }
        Some(TradesView {
            trades: guard.trades.iter().cloned().collect(),
            stale: guard.stale,
        })
    }

    /// Mark one symbol stale. Reads keep serving the last state.
    pub fn mark_stale(&self, symbol: &Symbol) {
        if let Some(entry) = self.entries.get(symbol) {
            entry.value().clone().write().stale = true;
        }
    }

    /// Mark everything stale, used when the session drops
    pub fn mark_all_stale(&self) {
        for entry in self.entries.iter() {
            entry.value().clone().write().stale = true;
        }
    }
}
