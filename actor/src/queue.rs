//! Unbounded multi-producer, single-consumer ring queue.
//!
//! Backs both mailbox channels. Producers serialize on the internal mutex;
//! the single consumer reads the atomic length before taking the lock, so an
//! empty check never contends. Capacity doubles when a push would collide
//! with the head; the queue never shrinks.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

pub struct RingQueue<T> {
    len: AtomicUsize,
    inner: Mutex<RingBuffer<T>>,
}

struct RingBuffer<T> {
    buffer: Vec<Option<T>>,
    head: usize,
    tail: usize,
    modulo: usize,
}

impl<T> RingQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(4)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            len: AtomicUsize::new(0),
            inner: Mutex::new(RingBuffer {
                buffer: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                modulo: capacity,
            }),
        }
    }

    pub fn push(&self, item: T) {
        let mut ring = self.inner.lock();
        ring.tail = (ring.tail + 1) % ring.modulo;
        if ring.tail == ring.head {
            ring.grow();
        }
        self.len.fetch_add(1, Ordering::SeqCst);
        let tail = ring.tail;
        ring.buffer[tail] = Some(item);
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop the oldest element. Single consumer: once the length check passes,
    /// the element is guaranteed to still be there when the lock is taken.
    pub fn pop(&self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let mut ring = self.inner.lock();
        ring.head = (ring.head + 1) % ring.modulo;
        let head = ring.head;
        let item = ring.buffer[head].take();
        self.len.fetch_sub(1, Ordering::SeqCst);
        item
    }
}

impl<T> Default for RingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RingBuffer<T> {
    /// Double the backing store. Called with `tail == head`, so copying
    /// `modulo` slots starting at the collision point moves the live elements
    /// head-first to the bottom of the new buffer.
    fn grow(&mut self) {
        let new_len = self.modulo * 2;
        let mut buffer: Vec<Option<T>> = (0..new_len).map(|_| None).collect();
        for i in 0..self.modulo {
            let idx = (self.tail + i) % self.modulo;
            buffer[i] = self.buffer[idx].take();
        }
        self.buffer = buffer;
        self.head = 0;
        self.tail = self.modulo;
        self.modulo = new_len;
    }
}
