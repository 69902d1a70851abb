use thiserror::Error;

/// Errores del dominio de música. Cada variante tiene un mensaje pensado
/// para mostrarse al usuario tal cual.
#[derive(Debug, Error)]
pub enum MusicError {
    /// El proveedor no pudo clasificar o traer la referencia.
    #[error("No pude resolver `{0}` 😔")]
    Resolution(String),

    /// URL de un sitio que no soportamos.
    #[error("No soporto esa fuente: `{0}`")]
    UnsupportedSource(String),

    /// Índice 1-based fuera del rango de la cola.
    #[error("No existe la canción número {0} en la cola")]
    IndexOutOfRange(usize),

    /// Se pidió activar un modo que ya estaba activo.
    #[error("Ese modo ya está activo")]
    AlreadyInMode,

    /// Operación sobre una cola vacía con el player inactivo.
    #[error("No hay nada en la cola")]
    AlreadyEmpty,

    /// Operación que necesita un track sonando y no hay ninguno.
    #[error("No hay ninguna canción sonando")]
    NothingPlaying,

    /// La conexión de voz no llegó a Ready dentro del plazo.
    #[error("La conexión de voz no respondió a tiempo")]
    ConnectionTimeout,

    /// Falló materializar o reproducir el stream de audio.
    #[error("No pude reproducir `{0}`")]
    PlaybackSource(String),
}
