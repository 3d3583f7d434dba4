/// Scratch copy of the message currently on the wire.
pub struct SendBuffer<const BUFSIZE: usize> {
    buf: [u8; BUFSIZE],
    pos: usize,
    end: usize,
}

impl<const BUFSIZE: usize> SendBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUFSIZE],
            pos: 0,
            end: 0,
        }
    }

    pub fn load(&mut self, payload: &[u8]) {
        assert!(
            payload.len() <= BUFSIZE,
            "Trying to write too much data into the send buffer"
        );

        if !self.is_empty() {
            panic!("Send buffer must be drained before loading.");
        }

        self.buf[..payload.len()].copy_from_slice(payload);
        self.pos = 0;
        self.end = payload.len();
    }

    pub fn bytes_sent(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.pos
    }
}

impl<const BUFSIZE: usize> Iterator for SendBuffer<BUFSIZE> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            None
        } else {
            self.pos += 1;
            Some(self.buf[self.pos - 1])
        }
    }
}
