//! The to-visit / visited route sets driving a run
//!
//! This module handles:
//! - Deduplicating discovered routes by path before they are queued
//! - Handing out each path to exactly one worker
//! - Detecting the end of a run: nothing queued and nothing in flight
//!
//! Pick order is arbitrary. Popping a route, checking it against the
//! visited set and marking it visited happen in one critical section.

use crate::url::Route;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct FrontierState {
    todo: HashMap<String, Route>,
    visited: HashSet<String>,
    in_flight: usize,
    closed: bool,
}

impl FrontierState {
    /// Takes one unvisited route and marks it visited and in flight
    fn pop(&mut self) -> Option<Route> {
        loop {
            let path = self.todo.keys().next()?.clone();
            let route = self.todo.remove(&path)?;
            if self.visited.insert(path) {
                self.in_flight += 1;
                return Some(route);
            }
        }
    }
}

/// Shared work queue of a run
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    /// Creates a frontier seeded with the given routes
    pub fn new(seeds: impl IntoIterator<Item = Route>) -> Self {
        let frontier = Self::default();
        for route in seeds {
            frontier.add(route);
        }
        frontier
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues a route unless its path was visited or is already queued
    ///
    /// # Returns
    ///
    /// `true` if the route was queued
    pub fn add(&self, route: Route) -> bool {
        let added = {
            let mut state = self.lock();
            if state.visited.contains(&route.path) || state.todo.contains_key(&route.path) {
                false
            } else {
                state.todo.insert(route.path.clone(), route);
                true
            }
        };
        if added {
            self.changed.notify_waiters();
        }
        added
    }

    /// Takes a specific queued route, as [`Frontier::next`] would
    pub fn take(&self, path: &str) -> Option<Route> {
        let mut state = self.lock();
        if state.closed || state.visited.contains(path) {
            return None;
        }
        let route = state.todo.remove(path)?;
        state.visited.insert(route.path.clone());
        state.in_flight += 1;
        Some(route)
    }

    /// Takes the next route, waiting while other workers may still add some
    ///
    /// # Returns
    ///
    /// * `Some(Route)` - A route this caller now owns; finish it with
    ///   [`Frontier::complete`]
    /// * `None` - The frontier is drained (or closed) and no route is in flight
    pub async fn next(&self) -> Option<Route> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a change between check and await is not lost
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(route) = state.pop() {
                    return Some(route);
                }
                if state.in_flight == 0 {
                    drop(state);
                    self.changed.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks a route handed out by `next` or `take` as finished
    ///
    /// Routes it discovered must have been added before this call.
    pub fn complete(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Stops handing out routes; waiting workers return `None`
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_waiters();
    }

    /// Number of paths handed out so far
    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    /// Number of queued routes
    pub fn pending_count(&self) -> usize {
        self.lock().todo.len()
    }
}
