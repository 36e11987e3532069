//! Double-buffered row transfer to the display.
//!
//! Two transfer buffers alternate: the decoder fills the active one while the
//! other is idle or on the bus. In overlapped mode a buffer handed to the
//! transfer thread is moved through a channel, so the producer cannot touch
//! it until the thread sends it back.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, SendError, Sender};
use log::{debug, error, info};

use crate::display::{DisplayDevice, Window};
use crate::dma::DmaAllocator;
use crate::error::{PlayerError, PlayerResult};

struct Transfer {
    window: Option<Window>,
    buf: Box<[u8]>,
    len: usize,
}

enum Job<D> {
    /// The display for the frame that starts now.
    Attach(D),
    Rows(Transfer),
    /// Frame done: hand the display back.
    Detach,
}

enum Done<D> {
    Buffer(Box<[u8]>, PlayerResult<()>),
    Display(D),
}

fn worker_gone() -> PlayerError {
    PlayerError::Display("transfer thread gone".into())
}

/// Transfer thread started once at setup and joined on drop. It owns the
/// display only between `Attach` and `Detach` of a frame.
pub struct TransferWorker<D> {
    jobs: Option<Sender<Job<D>>>,
    done: Receiver<Done<D>>,
    handle: Option<JoinHandle<()>>,
}

impl<D: DisplayDevice + Send + 'static> TransferWorker<D> {
    pub fn spawn(stack_size: usize) -> PlayerResult<Self> {
        let (jobs_tx, jobs_rx) = bounded::<Job<D>>(1);
        let (done_tx, done_rx) = bounded::<Done<D>>(2);
        let handle = thread::Builder::new()
            .name("mjpeg_transfer".to_string())
            .stack_size(stack_size)
            .spawn(move || transfer_worker(jobs_rx, done_tx))
            .map_err(|err| PlayerError::Display(format!("spawn transfer thread: {err}")))?;
        info!("transfer thread started, stack {stack_size} bytes");
        Ok(Self {
            jobs: Some(jobs_tx),
            done: done_rx,
            handle: Some(handle),
        })
    }
}

impl<D> Drop for TransferWorker<D> {
    fn drop(&mut self) {
        drop(self.jobs.take());
        // let a blocked send finish so the thread sees the closed queue
        for _ in self.done.iter() {}
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("transfer thread panicked");
            }
        }
    }
}

pub struct OutputScheduler {
    buffers: [Option<Box<[u8]>>; 2],
    active: usize,
}

impl OutputScheduler {
    pub fn new<A: DmaAllocator + ?Sized>(allocator: &mut A, size: usize) -> PlayerResult<Self> {
        let first = allocator.allocate(size)?;
        let second = allocator.allocate(size)?;
        Ok(Self {
            buffers: [Some(first), Some(second)],
            active: 0,
        })
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn buffer_len(&self) -> usize {
        self.buffers
            .iter()
            .flatten()
            .map(|b| b.len())
            .min()
            .unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.active = 0;
    }

    fn put_back(&mut self, buf: Box<[u8]>) {
        if let Some(slot) = self.buffers.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(buf);
        }
    }

    /// Run `f` with rows written straight to `display` on this thread.
    pub fn with_direct<D, T, F>(&mut self, display: &mut D, f: F) -> PlayerResult<T>
    where
        D: DisplayDevice,
        F: FnOnce(&mut RowPipe<'_, D>) -> PlayerResult<T>,
    {
        let mut pipe = RowPipe {
            scheduler: self,
            lane: Lane::Direct(display),
        };
        f(&mut pipe)
    }

    /// Run `f` while `worker` drains finished buffers to `display`. Returns
    /// once every buffer and the display are back; the display is `None`
    /// only if the transfer thread died.
    pub fn with_worker<D, T, F>(
        &mut self,
        worker: &TransferWorker<D>,
        display: D,
        f: F,
    ) -> (Option<D>, PlayerResult<T>)
    where
        D: DisplayDevice,
        F: FnOnce(&mut RowPipe<'_, D>) -> PlayerResult<T>,
    {
        let Some(jobs) = worker.jobs.as_ref() else {
            return (Some(display), Err(worker_gone()));
        };
        if let Err(SendError(job)) = jobs.send(Job::Attach(display)) {
            let display = match job {
                Job::Attach(display) => Some(display),
                _ => None,
            };
            return (display, Err(worker_gone()));
        }

        let mut pipe = RowPipe {
            scheduler: self,
            lane: Lane::Worker {
                jobs,
                done: &worker.done,
            },
        };
        let result = f(&mut pipe);
        let (display, drained) = pipe.detach();
        let result = match (result, drained) {
            (Err(err), _) | (Ok(_), Err(err)) => Err(err),
            (Ok(value), Ok(())) => Ok(value),
        };
        (display, result)
    }
}

enum Lane<'a, D> {
    Direct(&'a mut D),
    Worker {
        jobs: &'a Sender<Job<D>>,
        done: &'a Receiver<Done<D>>,
    },
}

/// The scheduler bound to one frame's display lane.
pub struct RowPipe<'a, D> {
    scheduler: &'a mut OutputScheduler,
    lane: Lane<'a, D>,
}

impl<'a, D: DisplayDevice> RowPipe<'a, D> {
    /// The buffer the converter writes into.
    pub fn active_buffer(&mut self) -> PlayerResult<&mut [u8]> {
        let active = self.scheduler.active;
        self.scheduler.buffers[active]
            .as_deref_mut()
            .ok_or_else(|| PlayerError::Display("active buffer still in flight".into()))
    }

    pub fn active_index(&self) -> usize {
        self.scheduler.active
    }

    /// Send `rows` rows of the active buffer and make the other buffer
    /// active. The panel window is set on the frame's first row group.
    pub fn flush_row_group(&mut self, window: Window, row_offset: u32, rows: u32) -> PlayerResult<()> {
        let row_bytes = window.width as usize * 2;
        let len = row_bytes * rows as usize;
        let capacity = self.scheduler.buffer_len();
        if len > capacity {
            return Err(PlayerError::RowGroupOverflow {
                rows,
                capacity: (capacity / row_bytes.max(1)) as u32,
            });
        }
        let window = (row_offset == 0).then_some(window);
        let active = self.scheduler.active;

        match &mut self.lane {
            Lane::Direct(display) => {
                let buf = self.scheduler.buffers[active]
                    .as_deref()
                    .ok_or_else(|| PlayerError::Display("active buffer still in flight".into()))?;
                send_rows(&mut **display, window, &buf[..len])?;
                self.scheduler.active ^= 1;
            }
            Lane::Worker { jobs, done } => {
                let buf = self.scheduler.buffers[active]
                    .take()
                    .ok_or_else(|| PlayerError::Display("active buffer still in flight".into()))?;
                if let Err(SendError(job)) = jobs.send(Job::Rows(Transfer { window, buf, len })) {
                    if let Job::Rows(job) = job {
                        self.scheduler.buffers[active] = Some(job.buf);
                    }
                    return Err(worker_gone());
                }
                self.scheduler.active ^= 1;
                let next = self.scheduler.active;
                if self.scheduler.buffers[next].is_none() {
                    // wait until the bus is done with it
                    match done.recv() {
                        Ok(Done::Buffer(buf, res)) => {
                            self.scheduler.buffers[next] = Some(buf);
                            res?;
                        }
                        Ok(Done::Display(_)) | Err(_) => return Err(worker_gone()),
                    }
                }
            }
        }
        debug!("row group at {row_offset}: {rows} rows, {len} bytes");
        Ok(())
    }

    /// End of frame: wait for every buffer and take the display back.
    fn detach(self) -> (Option<D>, PlayerResult<()>) {
        let Lane::Worker { jobs, done } = self.lane else {
            return (None, Ok(()));
        };
        if jobs.send(Job::Detach).is_err() {
            return (None, Err(worker_gone()));
        }
        let mut result = Ok(());
        loop {
            match done.recv() {
                Ok(Done::Buffer(buf, res)) => {
                    self.scheduler.put_back(buf);
                    if result.is_ok() {
                        result = res;
                    }
                }
                Ok(Done::Display(display)) => return (Some(display), result),
                Err(_) => return (None, Err(worker_gone())),
            }
        }
    }
}

fn send_rows<D: DisplayDevice + ?Sized>(
    display: &mut D,
    window: Option<Window>,
    data: &[u8],
) -> PlayerResult<()> {
    if let Some(window) = window {
        display.set_window(window)?;
    }
    display.begin_transfer()?;
    let written = display.write_bytes(data);
    display.end_transfer()?;
    written
}

fn transfer_worker<D: DisplayDevice>(jobs: Receiver<Job<D>>, done: Sender<Done<D>>) {
    let mut display = None;
    for job in jobs.iter() {
        let reply = match job {
            Job::Attach(d) => {
                display = Some(d);
                continue;
            }
            Job::Rows(job) => {
                let res = match display.as_mut() {
                    Some(d) => send_rows(d, job.window, &job.buf[..job.len]),
                    None => Err(PlayerError::Display("no display attached".into())),
                };
                if let Err(err) = &res {
                    error!("transfer failed: {err}");
                }
                Done::Buffer(job.buf, res)
            }
            Job::Detach => match display.take() {
                Some(d) => Done::Display(d),
                None => continue,
            },
        };
        if done.send(reply).is_err() {
            break;
        }
    }
    debug!("transfer thread exiting");
}
