use crate::bytes::encode_pointer;
use crate::{RepackError, Result};

/// Called once every member of a request group has an address.
pub type Continuation<'a> = Box<dyn FnOnce(&[usize], &mut Pass<'_, 'a>) -> Result<()> + 'a>;

/// One resolved request, in resolution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub label: String,
    pub address: usize,
    pub len: usize,
    pub reused: bool,
}

struct Request {
    group: usize,
    member: usize,
    label: String,
    bytes: Vec<u8>,
}

struct Group<'a> {
    addresses: Vec<Option<usize>>,
    remaining: usize,
    then: Option<Continuation<'a>>,
}

#[derive(Default)]
struct Queue<'a> {
    pending: Vec<Request>,
    groups: Vec<Group<'a>>,
    ready: Vec<usize>,
    patches: Vec<(usize, Vec<u8>)>,
}

impl<'a> Queue<'a> {
    fn submit_group(&mut self, label: &str, members: Vec<Vec<u8>>, then: Continuation<'a>) {
        let group = self.groups.len();
        let count = members.len();
        for (member, bytes) in members.into_iter().enumerate() {
            self.pending.push(Request {
                group,
                member,
                label: if count == 1 {
                    label.to_string()
                } else {
                    format!("{label} #{member}")
                },
                bytes,
            });
        }
        self.groups.push(Group {
            addresses: vec![None; count],
            remaining: count,
            then: Some(then),
        });
        if count == 0 {
            self.ready.push(group);
        }
    }
}

/// Handle given to continuations while a writer is finalizing.
pub struct Pass<'q, 'a> {
    queue: &'q mut Queue<'a>,
}

impl<'a> Pass<'_, 'a> {
    pub fn submit(
        &mut self,
        label: &str,
        bytes: Vec<u8>,
        then: impl FnOnce(usize, &mut Pass<'_, 'a>) -> Result<()> + 'a,
    ) {
        self.queue.submit_group(
            label,
            vec![bytes],
            Box::new(move |addresses: &[usize], pass: &mut Pass<'_, 'a>| {
                then(addresses[0], pass)
            }),
        );
    }

    pub fn submit_group(
        &mut self,
        label: &str,
        members: Vec<Vec<u8>>,
        then: impl FnOnce(&[usize], &mut Pass<'_, 'a>) -> Result<()> + 'a,
    ) {
        self.queue.submit_group(label, members, Box::new(then));
    }

    /// Queues raw bytes to be written at `offset` on commit.
    pub fn patch(&mut self, offset: usize, bytes: Vec<u8>) {
        self.queue.patches.push((offset, bytes));
    }

    /// Queues a bank-relative pointer to `address` at `slot`.
    pub fn write_pointer(&mut self, slot: usize, address: usize, bank_offset: usize) -> Result<()> {
        let encoded = encode_pointer(address, bank_offset)?;
        self.patch(slot, encoded.to_vec());
        Ok(())
    }
}

pub struct Writer<'a> {
    region: &'static str,
    start: usize,
    end: usize,
    position: usize,
    staged: Vec<u8>,
    queue: Queue<'a>,
    placements: Vec<Placement>,
}

impl<'a> Writer<'a> {
    pub fn new(region: &'static str, start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Writer {
            region,
            start,
            end,
            position: start,
            staged: Vec::with_capacity(end - start),
            queue: Queue::default(),
            placements: Vec::new(),
        }
    }

    pub fn region(&self) -> &'static str {
        self.region
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Next free address.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes placed so far, starting at `start`.
    pub fn placed(&self) -> &[u8] {
        &self.staged
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    pub fn submit(
        &mut self,
        label: &str,
        bytes: Vec<u8>,
        then: impl FnOnce(usize, &mut Pass<'_, 'a>) -> Result<()> + 'a,
    ) {
        self.pass().submit(label, bytes, then);
    }

    pub fn submit_group(
        &mut self,
        label: &str,
        members: Vec<Vec<u8>>,
        then: impl FnOnce(&[usize], &mut Pass<'_, 'a>) -> Result<()> + 'a,
    ) {
        self.pass().submit_group(label, members, then);
    }

    /// Queues raw bytes to be written at `offset` on commit.
    pub fn patch(&mut self, offset: usize, bytes: Vec<u8>) {
        self.pass().patch(offset, bytes);
    }

    fn pass(&mut self) -> Pass<'_, 'a> {
        Pass {
            queue: &mut self.queue,
        }
    }

    /// Resolves every pending request, including any submitted by
    /// continuations along the way.
    pub fn finalize(&mut self) -> Result<()> {
        loop {
            for group in std::mem::take(&mut self.queue.ready) {
                self.complete(group)?;
            }
            if self.queue.pending.is_empty() {
                if self.queue.ready.is_empty() {
                    return Ok(());
                }
                continue;
            }

            // Requests submitted by continuations wait for the next batch.
            // Longest first so shorter strings can land inside them; the sort
            // is stable, so ties keep submission order.
            let mut batch = std::mem::take(&mut self.queue.pending);
            batch.sort_by(|a, b| b.bytes.len().cmp(&a.bytes.len()));
            for request in batch {
                let address = self.place(&request)?;
                let group = &mut self.queue.groups[request.group];
                group.addresses[request.member] = Some(address);
                group.remaining -= 1;
                if group.remaining == 0 {
                    self.complete(request.group)?;
                }
            }
        }
    }

    fn complete(&mut self, group: usize) -> Result<()> {
        let group = &mut self.queue.groups[group];
        let addresses: Vec<usize> = group.addresses.iter().flatten().copied().collect();
        if let Some(then) = group.then.take() {
            then(&addresses, &mut Pass {
                queue: &mut self.queue,
            })?;
        }
        Ok(())
    }

    fn place(&mut self, request: &Request) -> Result<usize> {
        let len = request.bytes.len();
        // Only this writer's own bytes are searched, never the image.
        if let Some(found) = find(&self.staged, &request.bytes) {
            let address = self.start + found;
            self.placements.push(Placement {
                label: request.label.clone(),
                address,
                len,
                reused: true,
            });
            return Ok(address);
        }

        if self.position + len > self.end {
            return Err(RepackError::AllocationExhausted {
                region: self.region,
                label: request.label.clone(),
                start: self.start,
                end: self.end,
                position: self.position,
                len,
            });
        }

        let address = self.position;
        self.staged.extend_from_slice(&request.bytes);
        self.position += len;
        self.placements.push(Placement {
            label: request.label.clone(),
            address,
            len,
            reused: false,
        });
        Ok(address)
    }

    /// Copies the placed bytes into `prg` and applies every queued patch.
    /// Returns the number of bytes placed.
    pub fn commit(self, prg: &mut [u8]) -> Result<usize> {
        if !self.queue.pending.is_empty() {
            return Err(RepackError::Config(format!(
                "{} region committed with {} unresolved requests",
                self.region,
                self.queue.pending.len()
            )));
        }
        let len = prg.len();
        let target = prg.get_mut(self.start..self.position).ok_or_else(|| {
            RepackError::encode(
                self.region,
                format!("[{:#x}, {:#x}) is beyond {len:#x}", self.start, self.position),
            )
        })?;
        target.copy_from_slice(&self.staged);

        for (offset, bytes) in &self.queue.patches {
            let target = prg.get_mut(*offset..*offset + bytes.len()).ok_or_else(|| {
                RepackError::encode("pointer slot", format!("{offset:#x} is beyond {len:#x}"))
            })?;
            target.copy_from_slice(bytes);
        }
        Ok(self.position - self.start)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
