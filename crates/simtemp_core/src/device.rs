//! Leitura do character device `/dev/simtemp`.
//!
//! Uma [`Session`] é dona de exatamente um handle do device. A espera por
//! dados usa `poll(2)` com duas classes de evento: dados normais (`POLLIN`)
//! e alerta/prioridade (`POLLPRI`). Qualquer erro de I/O numa sessão aberta
//! encerra a sessão; ela nunca é reaberta aqui.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::protocol::{self, ProtocolError, RECORD_SIZE, Record};

/// Caminho padrão do device.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/simtemp";

/// Erros do leitor do device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device '{}' não encontrado. O módulo está carregado?", .0.display())]
    NotFound(PathBuf),

    #[error("Permissão negada ao abrir '{}'. Execute com privilégios elevados (ex.: sudo).", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Erro de I/O no device: {0}")]
    Io(#[from] io::Error),

    #[error("Leitura curta do device ({0} bytes)")]
    ShortRead(usize),

    #[error("Registro malformado: {0}")]
    Malformed(String),

    #[error("Nenhum dado disponível (leitura bloquearia)")]
    WouldBlock,

    #[error("Sessão do device fechada")]
    Closed,
}

impl DeviceError {
    fn from_open(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => DeviceError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(path.to_path_buf()),
            _ => DeviceError::Io(err),
        }
    }
}

impl From<ProtocolError> for DeviceError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ShortRead(n) => DeviceError::ShortRead(n),
            ProtocolError::Malformed(msg) => DeviceError::Malformed(msg),
        }
    }
}

/// Modo de abertura do device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Blocking,
    NonBlocking,
}

/// Classes de prontidão de interesse para [`Session::wait_readable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub data: bool,
    pub alert: bool,
}

impl Interest {
    pub const DATA: Interest = Interest {
        data: true,
        alert: false,
    };
    pub const ALERT: Interest = Interest {
        data: false,
        alert: true,
    };
    pub const BOTH: Interest = Interest {
        data: true,
        alert: true,
    };
    /// Nenhuma classe: a espera termina só por timeout, cancelamento ou erro.
    pub const NONE: Interest = Interest {
        data: false,
        alert: false,
    };

    fn poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.data {
            events |= libc::POLLIN;
        }
        if self.alert {
            events |= libc::POLLPRI;
        }
        events
    }
}

/// Resultado de uma espera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    TimedOut,
    Ready { data: bool, alert: bool },
    Cancelled,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

// ──────────────────────────────────────────────
// Cancelamento
// ──────────────────────────────────────────────

struct CancelInner {
    cancelled: AtomicBool,
    wake_tx: UnixStream,
    wake_rx: UnixStream,
}

/// Token de cancelamento clonável.
///
/// Além da flag, mantém um par de sockets: o lado de leitura entra no
/// `poll(2)` junto com o device, então [`CancelToken::cancel`] acorda uma
/// espera indefinida em vez de aguardar a próxima iteração.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    pub fn new() -> io::Result<Self> {
        let (wake_tx, wake_rx) = UnixStream::pair()?;
        wake_tx.set_nonblocking(true)?;
        wake_rx.set_nonblocking(true)?;
        Ok(Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
        })
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            // Buffer cheio também serve: o lado de leitura já está legível.
            let _ = (&self.inner.wake_tx).write(&[1]);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Descritor que fica legível após o cancelamento.
    pub fn wake_fd(&self) -> RawFd {
        self.inner.wake_rx.as_raw_fd()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ──────────────────────────────────────────────
// Device bruto
// ──────────────────────────────────────────────

/// Fonte de bytes com espera por prontidão.
///
/// [`CharDevice`] é a implementação real; testes usam um device simulado.
pub trait RawDevice: Send {
    /// Espera até uma das classes de `interest` ficar pronta, o timeout
    /// expirar (`None` = indefinido) ou `cancel` ser acionado.
    fn wait(
        &mut self,
        interest: Interest,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> io::Result<Readiness>;

    /// Uma chamada de `read(2)`. `WouldBlock` é reportado como erro de I/O
    /// desse tipo, como faz a `std`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// O character device real.
#[derive(Debug)]
pub struct CharDevice {
    file: File,
}

impl CharDevice {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self, DeviceError> {
        let mut options = OpenOptions::new();
        options.read(true);
        if mode == OpenMode::NonBlocking {
            options.custom_flags(libc::O_NONBLOCK);
        }
        let file = options
            .open(path)
            .map_err(|e| DeviceError::from_open(path, e))?;
        Ok(Self { file })
    }
}

fn poll_timeout_ms(remaining: Option<Duration>) -> libc::c_int {
    match remaining {
        None => -1,
        Some(d) => {
            // Arredonda para cima para não girar com timeouts sub-milissegundo.
            let ms = d.as_micros().div_ceil(1000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

impl RawDevice for CharDevice {
    fn wait(
        &mut self,
        interest: Interest,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> io::Result<Readiness> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut fds = [
            libc::pollfd {
                fd: self.file.as_raw_fd(),
                events: interest.poll_events(),
                revents: 0,
            },
            libc::pollfd {
                fd: cancel.map_or(-1, CancelToken::wake_fd),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Ok(Readiness::Cancelled);
            }
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            fds[0].revents = 0;
            fds[1].revents = 0;

            // SAFETY: `fds` é um array válido de pollfd durante a chamada;
            // fd negativo é ignorado pelo kernel.
            let rc = unsafe {
                libc::poll(
                    fds.as_mut_ptr(),
                    fds.len() as libc::nfds_t,
                    poll_timeout_ms(remaining),
                )
            };

            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if fds[1].revents != 0 {
                return Ok(Readiness::Cancelled);
            }
            if rc == 0 {
                return Ok(Readiness::TimedOut);
            }

            let revents = fds[0].revents;
            if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                return Err(io::Error::other(format!(
                    "poll reportou erro no device (revents=0x{revents:x})"
                )));
            }
            return Ok(Readiness::Ready {
                data: revents & libc::POLLIN != 0,
                alert: revents & libc::POLLPRI != 0,
            });
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

// ──────────────────────────────────────────────
// Sessão
// ──────────────────────────────────────────────

/// Tempo de vida de um handle aberto do device (leitor único).
pub struct Session<D: RawDevice = CharDevice> {
    device: Option<D>,
    mode: OpenMode,
}

impl Session<CharDevice> {
    /// Abre o device. `NotFound` e `PermissionDenied` são terminais.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        let device = CharDevice::open(path, mode)?;
        info!("Device {} aberto ({mode:?})", path.display());
        Ok(Self::from_device(device, mode))
    }
}

impl<D: RawDevice> Session<D> {
    pub fn from_device(device: D, mode: OpenMode) -> Self {
        Self {
            device: Some(device),
            mode,
        }
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Espera prontidão. Erro de I/O fecha a sessão.
    pub fn wait_readable(
        &mut self,
        timeout: Option<Duration>,
        interest: Interest,
        cancel: Option<&CancelToken>,
    ) -> Result<Readiness, DeviceError> {
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;
        match device.wait(interest, timeout, cancel) {
            Ok(readiness) => Ok(readiness),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Lê um registro.
    ///
    /// - `Ok(Some(record))`: exatamente [`RECORD_SIZE`] bytes lidos
    /// - `Ok(None)`: leitura de zero bytes, buffer do driver esvaziado
    /// - `Err(WouldBlock)`: modo não-bloqueante sem dados
    /// - `Err(ShortRead(n))`: violação de framing nesta leitura; a sessão
    ///   continua aberta
    /// - outros erros de I/O fecham a sessão
    pub fn read_record(&mut self) -> Result<Option<Record>, DeviceError> {
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;
        let mut buf = [0u8; RECORD_SIZE];
        let n = loop {
            match device.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(DeviceError::WouldBlock);
                }
                Err(e) => return Err(self.fail(e)),
            }
        };
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(protocol::decode_record(&buf[..n])?))
    }

    /// Libera o handle. Retorna `true` apenas na primeira chamada.
    pub fn close(&mut self) -> bool {
        match self.device.take() {
            Some(device) => {
                drop(device);
                debug!("Sessão do device fechada");
                true
            }
            None => false,
        }
    }

    fn fail(&mut self, err: io::Error) -> DeviceError {
        warn!("Erro de I/O no device, encerrando sessão: {err}");
        self.close();
        DeviceError::Io(err)
    }
}

impl<D: RawDevice> Drop for Session<D> {
    fn drop(&mut self) {
        self.close();
    }
}
