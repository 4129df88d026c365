use crate::boxes::FourCC;

/// Typed view over the box types this crate knows by name.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    // File-level / top-level
    Ftyp,
    Styp,
    Moov,
    Moof,
    Mdat,
    Free,
    Skip,
    Wide,
    Sidx,
    Mfra,

    // moov children
    Mvhd,
    Trak,
    Mvex,
    Udta,

    // mvex children
    Mehd,
    Trex,

    // trak children
    Tkhd,
    Edts,
    Mdia,

    // mdia children
    Mdhd,
    Hdlr,
    Minf,

    // minf children
    Vmhd,
    Smhd,
    Dinf,
    Stbl,

    // moof children
    Mfhd,
    Traf,

    // Extended type, never parsed
    Uuid,

    // Anything else
    Unknown(FourCC),
}

/// What the walker does with a box once its header is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Payload is a sequence of child boxes.
    Container,
    /// Payload is decoded by a registered decoder.
    Decode,
    /// Payload is skipped unread.
    Skip,
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        match &cc.0 {
            b"ftyp" => KnownBox::Ftyp,
            b"styp" => KnownBox::Styp,
            b"moov" => KnownBox::Moov,
            b"moof" => KnownBox::Moof,
            b"mdat" => KnownBox::Mdat,
            b"free" => KnownBox::Free,
            b"skip" => KnownBox::Skip,
            b"wide" => KnownBox::Wide,
            b"sidx" => KnownBox::Sidx,
            b"mfra" => KnownBox::Mfra,

            b"mvhd" => KnownBox::Mvhd,
            b"trak" => KnownBox::Trak,
            b"mvex" => KnownBox::Mvex,
            b"udta" => KnownBox::Udta,

            b"mehd" => KnownBox::Mehd,
            b"trex" => KnownBox::Trex,

            b"tkhd" => KnownBox::Tkhd,
            b"edts" => KnownBox::Edts,
            b"mdia" => KnownBox::Mdia,

            b"mdhd" => KnownBox::Mdhd,
            b"hdlr" => KnownBox::Hdlr,
            b"minf" => KnownBox::Minf,

            b"vmhd" => KnownBox::Vmhd,
            b"smhd" => KnownBox::Smhd,
            b"dinf" => KnownBox::Dinf,
            b"stbl" => KnownBox::Stbl,

            b"mfhd" => KnownBox::Mfhd,
            b"traf" => KnownBox::Traf,

            b"uuid" => KnownBox::Uuid,

            _ => KnownBox::Unknown(cc),
        }
    }
}

impl KnownBox {
    /// Does this box *contain* child boxes that the walker descends into?
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            KnownBox::Moov
                | KnownBox::Mvex
                | KnownBox::Mdia
                | KnownBox::Minf
                | KnownBox::Stbl
                | KnownBox::Trak
                | KnownBox::Moof
        )
    }

    /// Is this box semantically decoded?
    pub fn is_decoded(&self) -> bool {
        matches!(
            self,
            KnownBox::Ftyp | KnownBox::Mvhd | KnownBox::Mehd | KnownBox::Mfhd
        )
    }

    pub fn handler(&self) -> Handler {
        if self.is_container() {
            Handler::Container
        } else if self.is_decoded() {
            Handler::Decode
        } else {
            Handler::Skip
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            KnownBox::Ftyp => "File Type Box",
            KnownBox::Styp => "Segment Type Box",
            KnownBox::Moov => "Movie Box",
            KnownBox::Moof => "Movie Fragment Box",
            KnownBox::Mdat => "Media Data Box",
            KnownBox::Free => "Free Space Box",
            KnownBox::Skip => "Free Space Box",
            KnownBox::Wide => "Wide Box",
            KnownBox::Sidx => "Segment Index Box",
            KnownBox::Mfra => "Movie Fragment Random Access Box",
            KnownBox::Mvhd => "Movie Header Box",
            KnownBox::Trak => "Track Box",
            KnownBox::Mvex => "Movie Extends Box",
            KnownBox::Udta => "User Data Box",
            KnownBox::Mehd => "Movie Extends Header Box",
            KnownBox::Trex => "Track Extends Box",
            KnownBox::Tkhd => "Track Header Box",
            KnownBox::Edts => "Edit Box",
            KnownBox::Mdia => "Media Box",
            KnownBox::Mdhd => "Media Header Box",
            KnownBox::Hdlr => "Handler Reference Box",
            KnownBox::Minf => "Media Information Box",
            KnownBox::Vmhd => "Video Media Header Box",
            KnownBox::Smhd => "Sound Media Header Box",
            KnownBox::Dinf => "Data Information Box",
            KnownBox::Stbl => "Sample Table Box",
            KnownBox::Mfhd => "Movie Fragment Header Box",
            KnownBox::Traf => "Track Fragment Box",
            KnownBox::Uuid => "User Extension Box",
            KnownBox::Unknown(_) => "Unknown Box",
        }
    }
}
