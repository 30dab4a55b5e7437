//! Views the client can navigate between.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    Intro,
    Login,
    Register,
    Home,
    BrowseModels,
    ModelDetails,
    ClassifyImage,
    TrainNewModel,
    ConfirmResetPin,
    ResetPassword,
}

impl Route {
    /// Entry view of the application.
    pub const INITIAL: Self = Self::Intro;

    pub fn title(self) -> &'static str {
        match self {
            Self::Intro => "Intro",
            Self::Login => "Login",
            Self::Register => "Register",
            Self::Home => "Home",
            Self::BrowseModels => "Browse Models",
            Self::ModelDetails => "Model Details",
            Self::ClassifyImage => "Classify Image",
            Self::TrainNewModel => "Train New Model",
            Self::ConfirmResetPin => "Confirm Reset Pin",
            Self::ResetPassword => "Reset Password",
        }
    }
}
