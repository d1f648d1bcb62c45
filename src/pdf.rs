use std::fmt;

use log::warn;
use printpdf::{
	BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfLayerReference,
};

use crate::koperasi::error::{Error, ErrorKind};
use crate::member::Member;

/// Fixed-layout A4 membership form ("Formulir Anggota").
///
/// Photo and signature are embedded when their bytes are supplied and
/// decodable; an undecodable image degrades to the blank placeholder
/// rather than failing the whole form.
pub fn membership_form(
	member: &Member,
	photo: Option<&[u8]>,
	signature: Option<&[u8]>,
) -> Result<Vec<u8>, Error> {
	let (doc, page, layer) = PdfDocument::new("Formulir Anggota Koperasi", Mm(210.0), Mm(297.0), "form");
	let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
	let font_bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;

	let current_layer = doc.get_page(page).get_layer(layer);

	current_layer.use_text("FORMULIR KEANGGOTAAN KOPERASI", 16.0, Mm(40.0), Mm(275.0), &font_bold);

	let blank = "-".to_string();
	let fields: Vec<(&str, &str)> = vec![
		("No. Anggota", member.member_number.as_ref().unwrap_or(&blank)),
		("NIK", &member.nik),
		("Nama", &member.name),
		("Tempat Lahir", member.birth_place.as_ref().unwrap_or(&blank)),
		("Jenis Kelamin", member.gender.as_ref().unwrap_or(&blank)),
		("Alamat", member.address.as_ref().unwrap_or(&blank)),
		("Telepon", member.phone.as_ref().unwrap_or(&blank)),
		("Perusahaan", member.company.as_ref().unwrap_or(&blank)),
		("Unit Kerja", member.work_unit.as_ref().unwrap_or(&blank)),
		("Lokasi Kerja", member.work_location.as_ref().unwrap_or(&blank)),
		("Jabatan", member.position.as_ref().unwrap_or(&blank)),
	];

	let mut y = 260.0;
	for (label, value) in fields {
		current_layer.use_text(label, 11.0, Mm(20.0), Mm(y), &font);
		current_layer.use_text(":", 11.0, Mm(60.0), Mm(y), &font);
		current_layer.use_text(value, 11.0, Mm(65.0), Mm(y), &font);
		y -= 8.0;
	}

	embed_image(&current_layer, photo, Mm(20.0), Mm(70.0), "Foto", &font);
	embed_image(&current_layer, signature, Mm(120.0), Mm(70.0), "Tanda Tangan", &font);

	doc.save_to_bytes().map_err(pdf_err)
}

fn embed_image(
	layer: &PdfLayerReference,
	bytes: Option<&[u8]>,
	x: Mm,
	y: Mm,
	caption: &str,
	font: &IndirectFontRef,
) {
	layer.use_text(caption, 10.0, x, Mm(y.0 - 6.0), font);

	let bytes = match bytes {
		Some(bytes) => bytes,
		None => return,
	};

	match printpdf::image_crate::load_from_memory(bytes) {
		Ok(decoded) => {
			let image = Image::from_dynamic_image(&decoded);
			image.add_to_layer(layer.clone(), ImageTransform {
				translate_x: Some(x),
				translate_y: Some(y),
				dpi: Some(300.0),
				..Default::default()
			});
		}
		Err(e) => warn!("skipping undecodable {} image: {}", caption, e),
	}
}

fn pdf_err<E: fmt::Display>(e: E) -> Error {
	Error::new(ErrorKind::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
	use chrono::Utc;
	use uuid::Uuid;

	use crate::member::MemberStatus;

	use super::*;

	fn member() -> Member {
		Member {
			id: Uuid::new_v4(),
			user_id: Uuid::new_v4(),
			member_number: Some("0001/KOP/08/2026".to_string()),
			nik: "3201234567890001".to_string(),
			name: "Budi Santoso".to_string(),
			birth_place: Some("Bandung".to_string()),
			birth_date: None,
			gender: Some("L".to_string()),
			address: None,
			phone: None,
			company: Some("PT Maju".to_string()),
			work_unit: None,
			work_location: None,
			position: None,
			status: MemberStatus::Active,
			photo_url: None,
			signature_url: None,
			join_date: None,
			created_at: Utc::now(),
		}
	}

	#[test]
	fn form_renders_without_images() {
		let bytes = membership_form(&member(), None, None).unwrap();
		assert!(bytes.starts_with(b"%PDF"));
	}

	#[test]
	fn undecodable_image_does_not_fail_the_form() {
		let bytes = membership_form(&member(), Some(b"not an image"), None).unwrap();
		assert!(bytes.starts_with(b"%PDF"));
	}
}
