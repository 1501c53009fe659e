/// Identifier harvested from an archive page.
/// Example: `http://resolver.kb.nl/resolve?urn=ddd:010567709:mpeg21:a0493:ocr`
pub type RecordId = String;
/// Identifier for the archive adapter that produced a record.
/// Examples: `sru`, `rows`
pub type ArchiveId = String;
/// Search query sent to an archive.
/// Example: `type=artikel AND date within "1890-01-01 1899-12-31"`
pub type Query = String;
/// Content term component of a sampling criterion.
/// Example: `kaukasisch AND date within "1890-01-01 1899-12-31" AND type=artikel`
pub type ContentTag = String;
/// Spatial component of a sampling criterion.
/// Examples: `Landelijk`, `Regionaal/lokaal`, `Nederlands-Indië / Indonesië`
pub type SpatialTag = String;
/// Extract text assembled from adjacent sentences.
/// Example: `Eerste zin.\n\nTweede zin met doelwoord.\n\nDerde zin.`
pub type ExtractText = String;
