use chrono::Utc;
use rollcall_core::{
    AttendanceRecord, AttendanceStore, CheckIn, DatePolicy, Descriptor, EuclideanMatcher,
    Registration, StudentId, StudentRecord,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    fn store<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        EngineError::Store(Box::new(err))
    }
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Matching parameters fixed for the engine's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub threshold: f32,
    pub policy: DatePolicy,
}

/// Messages sent from command handlers to the engine thread.
enum EngineRequest {
    Register {
        student: StudentRecord,
        class_name: Option<String>,
        reply: Reply<Registration>,
    },
    CheckIn {
        descriptor: Descriptor,
        class_name: String,
        reply: Reply<CheckIn>,
    },
    Students {
        reply: Reply<Vec<StudentRecord>>,
    },
    Attendance {
        class_name: Option<String>,
        reply: Reply<Vec<AttendanceRecord>>,
    },
    Classes {
        reply: Reply<Vec<String>>,
    },
    RemoveStudent {
        id: StudentId,
        reply: Reply<bool>,
    },
    RemoveAllStudents {
        reply: Reply<usize>,
    },
    ClearAttendance {
        class_name: Option<String>,
        reply: Reply<usize>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Every store access goes through the single engine thread, so a check-in's
/// read-check-write can never interleave with another writer.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Register a student, checking them in when `class_name` is set.
    pub async fn register(
        &self,
        student: StudentRecord,
        class_name: Option<String>,
    ) -> Result<Registration, EngineError> {
        self.request(|reply| EngineRequest::Register {
            student,
            class_name,
            reply,
        })
        .await
    }

    /// Match a descriptor and log attendance for `class_name`.
    pub async fn check_in(
        &self,
        descriptor: Descriptor,
        class_name: String,
    ) -> Result<CheckIn, EngineError> {
        self.request(|reply| EngineRequest::CheckIn {
            descriptor,
            class_name,
            reply,
        })
        .await
    }

    pub async fn students(&self) -> Result<Vec<StudentRecord>, EngineError> {
        self.request(|reply| EngineRequest::Students { reply }).await
    }

    pub async fn attendance(
        &self,
        class_name: Option<String>,
    ) -> Result<Vec<AttendanceRecord>, EngineError> {
        self.request(|reply| EngineRequest::Attendance { class_name, reply })
            .await
    }

    pub async fn classes(&self) -> Result<Vec<String>, EngineError> {
        self.request(|reply| EngineRequest::Classes { reply }).await
    }

    pub async fn remove_student(&self, id: StudentId) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::RemoveStudent { id, reply })
            .await
    }

    pub async fn remove_all_students(&self) -> Result<usize, EngineError> {
        self.request(|reply| EngineRequest::RemoveAllStudents { reply })
            .await
    }

    pub async fn clear_attendance(&self, class_name: Option<String>) -> Result<usize, EngineError> {
        self.request(|reply| EngineRequest::ClearAttendance { class_name, reply })
            .await
    }
}

/// Spawn the engine on a dedicated OS thread that owns `store`.
///
/// The thread exits once every [`EngineHandle`] has been dropped.
pub fn spawn_engine<S>(store: S, settings: EngineSettings) -> Result<EngineHandle, EngineError>
where
    S: AttendanceStore + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let mut store = store;
            tracing::debug!(
                threshold = settings.threshold,
                timezone = %settings.policy,
                "engine thread started"
            );
            while let Some(req) = rx.blocking_recv() {
                handle(&mut store, settings, req);
            }
            tracing::debug!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn handle<S: AttendanceStore>(store: &mut S, settings: EngineSettings, req: EngineRequest) {
    // A dropped receiver means the caller gave up; nothing to do with the result.
    match req {
        EngineRequest::Register {
            student,
            class_name,
            reply,
        } => {
            let result = rollcall_core::register(
                store,
                student,
                class_name.as_deref(),
                settings.policy,
                Utc::now(),
            )
            .map_err(EngineError::store);
            let _ = reply.send(result);
        }
        EngineRequest::CheckIn {
            descriptor,
            class_name,
            reply,
        } => {
            let result = rollcall_core::check_in(
                store,
                &EuclideanMatcher,
                &descriptor,
                &class_name,
                settings.threshold,
                settings.policy,
                Utc::now(),
            )
            .map_err(EngineError::store);
            let _ = reply.send(result);
        }
        EngineRequest::Students { reply } => {
            let _ = reply.send(store.all_students().map_err(EngineError::store));
        }
        EngineRequest::Attendance { class_name, reply } => {
            let result = store
                .all_attendance(class_name.as_deref())
                .map_err(EngineError::store);
            let _ = reply.send(result);
        }
        EngineRequest::Classes { reply } => {
            let _ = reply.send(store.class_names().map_err(EngineError::store));
        }
        EngineRequest::RemoveStudent { id, reply } => {
            let result = store.delete_student(id).map_err(EngineError::store);
            if let Ok(removed) = result {
                tracing::info!(student_id = id, removed, "remove student");
            }
            let _ = reply.send(result);
        }
        EngineRequest::RemoveAllStudents { reply } => {
            let _ = reply.send(store.delete_all_students().map_err(EngineError::store));
        }
        EngineRequest::ClearAttendance { class_name, reply } => {
            let result = store
                .clear_attendance(class_name.as_deref())
                .map_err(EngineError::store);
            let _ = reply.send(result);
        }
    }
}
