//! Exec stop codes.
//!
//! When the exec cannot continue it stops with one of these codes.
//! Several conditions share a numeric code.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize)]
pub enum StopCode {
    FacilitiesComplex,
    UseStatementToExecPCTFailed,
    FileAssignErrorDuringInit,
    InternalExecIOFailed,
    FullCycleReachedForRunids,
    InitializationSystemLibrariesCorruptOrMissing,
    ExecRequestForMassStorageFailed,
    ErrorAccessingFacilitiesDataStructure,
    ConsoleResponseRequiresReboot,
    TrackToBeReleasedWasNotAllocated,
    NoMainItemLink,
    InitializationSystemConfigurationError,
    ClearTestSetAttemptedWhenNotSet,
    ResourceReleaseFailure,
    ActivityIdNoLongerExists,
    ExecContingencyHandler,
    ExecActivityTakenToEMode,
    IOErrorBootTape,
    OperatorInitiatedRecovery,
    DirectoryErrors,
    SectorToBeReleasedWasNotAllocated,
    IOPacketErrorForSystemIO,
    ErrorInSystemIOTable,
    InvalidLDAT,
}

impl StopCode {
    pub const ALL: [StopCode; 24] = [
        StopCode::FacilitiesComplex,
        StopCode::UseStatementToExecPCTFailed,
        StopCode::FileAssignErrorDuringInit,
        StopCode::InternalExecIOFailed,
        StopCode::FullCycleReachedForRunids,
        StopCode::InitializationSystemLibrariesCorruptOrMissing,
        StopCode::ExecRequestForMassStorageFailed,
        StopCode::ErrorAccessingFacilitiesDataStructure,
        StopCode::ConsoleResponseRequiresReboot,
        StopCode::TrackToBeReleasedWasNotAllocated,
        StopCode::NoMainItemLink,
        StopCode::InitializationSystemConfigurationError,
        StopCode::ClearTestSetAttemptedWhenNotSet,
        StopCode::ResourceReleaseFailure,
        StopCode::ActivityIdNoLongerExists,
        StopCode::ExecContingencyHandler,
        StopCode::ExecActivityTakenToEMode,
        StopCode::IOErrorBootTape,
        StopCode::OperatorInitiatedRecovery,
        StopCode::DirectoryErrors,
        StopCode::SectorToBeReleasedWasNotAllocated,
        StopCode::IOPacketErrorForSystemIO,
        StopCode::ErrorInSystemIOTable,
        StopCode::InvalidLDAT,
    ];

    /// The numeric stop code reported on the console.
    pub fn code(self) -> u32 {
        match self {
            StopCode::FacilitiesComplex => 0o1,
            StopCode::UseStatementToExecPCTFailed => 0o31,
            StopCode::FileAssignErrorDuringInit => 0o34,
            StopCode::InternalExecIOFailed => 0o40,
            StopCode::FullCycleReachedForRunids
            | StopCode::InitializationSystemLibrariesCorruptOrMissing => 0o44,
            StopCode::ExecRequestForMassStorageFailed => 0o52,
            StopCode::ErrorAccessingFacilitiesDataStructure
            | StopCode::ConsoleResponseRequiresReboot => 0o55,
            StopCode::TrackToBeReleasedWasNotAllocated | StopCode::NoMainItemLink => 0o57,
            StopCode::InitializationSystemConfigurationError => 0o64,
            StopCode::ClearTestSetAttemptedWhenNotSet => 0o66,
            StopCode::ResourceReleaseFailure => 0o67,
            StopCode::ActivityIdNoLongerExists => 0o73,
            StopCode::ExecContingencyHandler => 0o103,
            StopCode::ExecActivityTakenToEMode => 0o105,
            StopCode::IOErrorBootTape => 0o145,
            StopCode::OperatorInitiatedRecovery => 0o150,
            StopCode::DirectoryErrors => 0o151,
            StopCode::SectorToBeReleasedWasNotAllocated => 0o157,
            StopCode::IOPacketErrorForSystemIO => 0o202,
            StopCode::ErrorInSystemIOTable => 0o205,
            StopCode::InvalidLDAT => 0o253,
        }
    }

    /// The first stop code with the given number, if there is one.
    pub fn from_code(code: u32) -> Option<StopCode> {
        StopCode::ALL.iter().copied().find(|stop| stop.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            StopCode::FacilitiesComplex => "FacilitiesComplex",
            StopCode::UseStatementToExecPCTFailed => "UseStatementToExecPCTFailed",
            StopCode::FileAssignErrorDuringInit => "FileAssignErrorDuringInit",
            StopCode::InternalExecIOFailed => "InternalExecIOFailed",
            StopCode::FullCycleReachedForRunids => "FullCycleReachedForRunids",
            StopCode::InitializationSystemLibrariesCorruptOrMissing => {
                "InitializationSystemLibrariesCorruptOrMissing"
            }
            StopCode::ExecRequestForMassStorageFailed => "ExecRequestForMassStorageFailed",
            StopCode::ErrorAccessingFacilitiesDataStructure => {
                "ErrorAccessingFacilitiesDataStructure"
            }
            StopCode::ConsoleResponseRequiresReboot => "ConsoleResponseRequiresReboot",
            StopCode::TrackToBeReleasedWasNotAllocated => "TrackToBeReleasedWasNotAllocated",
            StopCode::NoMainItemLink => "NoMainItemLink",
            StopCode::InitializationSystemConfigurationError => {
                "InitializationSystemConfigurationError"
            }
            StopCode::ClearTestSetAttemptedWhenNotSet => "ClearTestSetAttemptedWhenNotSet",
            StopCode::ResourceReleaseFailure => "ResourceReleaseFailure",
            StopCode::ActivityIdNoLongerExists => "ActivityIdNoLongerExists",
            StopCode::ExecContingencyHandler => "ExecContingencyHandler",
            StopCode::ExecActivityTakenToEMode => "ExecActivityTakenToEMode",
            StopCode::IOErrorBootTape => "IOErrorBootTape",
            StopCode::OperatorInitiatedRecovery => "OperatorInitiatedRecovery",
            StopCode::DirectoryErrors => "DirectoryErrors",
            StopCode::SectorToBeReleasedWasNotAllocated => "SectorToBeReleasedWasNotAllocated",
            StopCode::IOPacketErrorForSystemIO => "IOPacketErrorForSystemIO",
            StopCode::ErrorInSystemIOTable => "ErrorInSystemIOTable",
            StopCode::InvalidLDAT => "InvalidLDAT",
        }
    }
}

impl Display for StopCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:03o} ({})", self.code(), self.name())
    }
}

#[test]
fn test_shared_codes() {
    assert_eq!(StopCode::NoMainItemLink.code(), 0o57);
    assert_eq!(
        StopCode::NoMainItemLink.code(),
        StopCode::TrackToBeReleasedWasNotAllocated.code()
    );
    assert_eq!(StopCode::InvalidLDAT.to_string(), "253 (InvalidLDAT)");
    assert_eq!(StopCode::FacilitiesComplex.to_string(), "001 (FacilitiesComplex)");
}

#[test]
fn test_from_code() {
    assert_eq!(StopCode::from_code(0o150), Some(StopCode::OperatorInitiatedRecovery));
    assert_eq!(StopCode::from_code(0o57), Some(StopCode::TrackToBeReleasedWasNotAllocated));
    assert_eq!(StopCode::from_code(0o2), None);
    for stop in StopCode::ALL {
        assert_eq!(StopCode::from_code(stop.code()).map(StopCode::code), Some(stop.code()));
    }
}
