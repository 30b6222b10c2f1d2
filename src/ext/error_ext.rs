use std::error::Error;

pub trait ErrorExt {
    /// Renders the error followed by its whole source chain on one line.
    fn describe(&self) -> String;
}

impl<E: Error + ?Sized> ErrorExt for E {
    fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}
