use std::sync::Mutex;

const MIN_CAPACITY: usize = 4 * 1024;
const GROWN_CAPACITY: usize = 16 * 1024;

/// A small pool of reusable line-scanner buffers (spec.md §4.B: "pooled
/// buffer, initial >= 4 KiB, grow to >= 16 KiB to tolerate wide SSE lines").
/// Grounded in the teacher's habit of pooling request/response structs
/// rather than allocating fresh ones per request.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Vec<u8> {
        self.free
            .lock()
            .expect("buffer pool mutex poisoned")
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(MIN_CAPACITY))
    }

    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        if buf.capacity() > GROWN_CAPACITY * 4 {
            // Don't let one huge line permanently inflate the pool.
            return;
        }
        let mut free = self.free.lock().expect("buffer pool mutex poisoned");
        if free.len() < 64 {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_released_buffers() {
        let pool = BufferPool::new();
        let buf = pool.acquire();
        assert!(buf.capacity() >= MIN_CAPACITY);
        pool.release(buf);
        let again = pool.acquire();
        assert!(again.capacity() >= MIN_CAPACITY);
    }
}
